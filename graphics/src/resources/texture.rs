//! GPU texture resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuTexture};
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{Handle, HandleId};
use crate::types::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

/// Reference-counted texture handle.
pub type TextureHandle = Handle<Texture>;

/// Bytes per pixel assumed by [`Texture::estimated_size`].
pub const ESTIMATED_BYTES_PER_PIXEL: u64 = 4;

/// A GPU texture resource.
pub struct Texture {
    id: HandleId,
    backend: Arc<dyn GpuBackend>,
    descriptor: TextureDescriptor,
    native: Mutex<Option<GpuTexture>>,
}

impl Texture {
    pub(crate) fn new(
        id: HandleId,
        backend: Arc<dyn GpuBackend>,
        descriptor: TextureDescriptor,
        native: GpuTexture,
    ) -> Self {
        Self {
            id,
            backend,
            descriptor,
            native: Mutex::new(Some(native)),
        }
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Approximate memory footprint: `width * height * 4`, whatever the format.
    /// Saturates at `u64::MAX`.
    pub fn estimated_size(&self) -> u64 {
        u64::from(self.descriptor.size.width)
            .saturating_mul(u64::from(self.descriptor.size.height))
            .saturating_mul(ESTIMATED_BYTES_PER_PIXEL)
    }

    /// The native texture, while alive.
    pub fn native(&self) -> GraphicsResult<GpuTexture> {
        (*self.native.lock())
            .ok_or_else(|| GraphicsError::AlreadyDisposed(self.id.to_string()))
    }

    /// Replace the base mip level with tightly packed texel data.
    pub fn write(&self, data: &[u8]) -> GraphicsResult<()> {
        let native = self.native()?;
        if !self.descriptor.usage.contains(TextureUsage::COPY_DST) {
            return Err(GraphicsError::validation(format!(
                "{} was not created with COPY_DST",
                self.id
            )));
        }
        let expected = self.descriptor.base_level_size().ok_or_else(|| {
            GraphicsError::validation(format!("{} is too large to upload", self.id))
        })?;
        if data.len() as u64 != expected {
            return Err(GraphicsError::validation(format!(
                "{} expects {expected} bytes, got {}",
                self.id,
                data.len()
            )));
        }
        self.backend.write_texture(native, data)
    }

    pub(crate) fn take_native(&self) -> Option<GpuTexture> {
        self.native.lock().take()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
