//! GPU buffer resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuBuffer};
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{Handle, HandleId};
use crate::types::{BufferDescriptor, BufferUsage, MapMode};

/// Reference-counted buffer handle issued by the [`ResourceManager`](super::ResourceManager).
pub type BufferHandle = Handle<Buffer>;

/// A GPU buffer resource.
///
/// Reached through a [`BufferHandle`]. Once the handle is disposed the native
/// buffer is gone and every operation here fails with
/// [`GraphicsError::AlreadyDisposed`].
///
/// # Example
///
/// ```ignore
/// let buffer = resources.create_buffer(&plugin, &BufferDescriptor::new(64, BufferUsage::UNIFORM))?;
/// buffer.write(0, &[0u8; 16])?;
/// ```
pub struct Buffer {
    id: HandleId,
    backend: Arc<dyn GpuBackend>,
    descriptor: BufferDescriptor,
    native: Mutex<Option<GpuBuffer>>,
    mapping: Mutex<Option<MapMode>>,
}

impl Buffer {
    pub(crate) fn new(
        id: HandleId,
        backend: Arc<dyn GpuBackend>,
        descriptor: BufferDescriptor,
        native: GpuBuffer,
    ) -> Self {
        Self {
            id,
            backend,
            descriptor,
            native: Mutex::new(Some(native)),
            mapping: Mutex::new(None),
        }
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// The native buffer, while alive.
    pub fn native(&self) -> GraphicsResult<GpuBuffer> {
        (*self.native.lock()).ok_or_else(|| self.disposed())
    }

    /// Upload `data` at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let native = self.native()?;
        self.check_range(offset, data.len() as u64)?;
        if *self.mapping.lock() == Some(MapMode::Read) {
            return Err(GraphicsError::validation(format!(
                "{} is mapped for reading",
                self.id
            )));
        }
        self.backend.write_buffer(native, offset, data)
    }

    /// Map the buffer for CPU access.
    pub fn map(&self, mode: MapMode) -> GraphicsResult<()> {
        self.native()?;
        if !self.descriptor.usage.contains(mode.required_usage()) {
            return Err(GraphicsError::validation(format!(
                "{} lacks {:?} usage required for {mode:?} mapping",
                self.id,
                mode.required_usage()
            )));
        }
        let mut mapping = self.mapping.lock();
        if let Some(current) = *mapping {
            return Err(GraphicsError::validation(format!(
                "{} is already mapped ({current:?})",
                self.id
            )));
        }
        *mapping = Some(mode);
        Ok(())
    }

    /// Read `size` bytes at `offset` from a buffer mapped for reading.
    pub fn read_mapped(&self, offset: u64, size: u64) -> GraphicsResult<Vec<u8>> {
        let native = self.native()?;
        if *self.mapping.lock() != Some(MapMode::Read) {
            return Err(GraphicsError::validation(format!(
                "{} is not mapped for reading",
                self.id
            )));
        }
        self.check_range(offset, size)?;
        self.backend.read_buffer(native, offset, size)
    }

    pub fn unmap(&self) -> GraphicsResult<()> {
        self.native()?;
        if self.mapping.lock().take().is_none() {
            return Err(GraphicsError::validation(format!("{} is not mapped", self.id)));
        }
        Ok(())
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.lock().is_some()
    }

    /// Detach the native buffer for destruction. Returns `None` if already taken.
    pub(crate) fn take_native(&self) -> Option<GpuBuffer> {
        self.mapping.lock().take();
        self.native.lock().take()
    }

    fn check_range(&self, offset: u64, len: u64) -> GraphicsResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.descriptor.size => Ok(()),
            _ => Err(GraphicsError::validation(format!(
                "range {offset}..+{len} is outside {} of size {}",
                self.id, self.descriptor.size
            ))),
        }
    }

    fn disposed(&self) -> GraphicsError {
        GraphicsError::AlreadyDisposed(self.id.to_string())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);
