//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// How a buffer may be used. Checked by the command encoder and by
    /// mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
        const MAP_READ = 1 << 7;
        const MAP_WRITE = 1 << 8;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parameters for [`ResourceManager::create_buffer`](crate::ResourceManager::create_buffer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Size in bytes; zero is rejected.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Access mode requested when mapping a buffer for CPU access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Map for reading; requires [`BufferUsage::MAP_READ`].
    Read,
    /// Map for writing; requires [`BufferUsage::MAP_WRITE`].
    Write,
}

impl MapMode {
    /// The usage flag a buffer must carry to be mapped in this mode.
    pub fn required_usage(self) -> BufferUsage {
        match self {
            Self::Read => BufferUsage::MAP_READ,
            Self::Write => BufferUsage::MAP_WRITE,
        }
    }
}

/// Index element format for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor_label() {
        let desc = BufferDescriptor::new(256, BufferUsage::UNIFORM).with_label("camera");
        assert_eq!(desc.label.as_deref(), Some("camera"));
        assert_eq!(desc.size, 256);
    }

    #[test]
    fn test_map_mode_required_usage() {
        assert_eq!(MapMode::Read.required_usage(), BufferUsage::MAP_READ);
        assert_eq!(MapMode::Write.required_usage(), BufferUsage::MAP_WRITE);
    }
}
