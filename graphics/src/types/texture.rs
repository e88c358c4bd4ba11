//! Texture descriptors.

use bitflags::bitflags;

use super::Extent3d;

/// Texel formats the host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    R8Uint,
    R16Float,
    Rg8Unorm,
    R32Float,
    R32Uint,
    #[default]
    Rgba8Unorm,
    /// Format of textures created from decoded images.
    Rgba8UnormSrgb,
    /// Typical swapchain format.
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth16Unorm,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Depth formats can only be used as depth-stencil attachments.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm | Self::Depth24PlusStencil8 | Self::Depth32Float
        )
    }

    pub fn has_stencil(self) -> bool {
        self == Self::Depth24PlusStencil8
    }

    /// Bytes per texel.
    pub fn block_size(self) -> u32 {
        use TextureFormat::*;
        match self {
            R8Unorm | R8Uint => 1,
            R16Float | Rg8Unorm | Depth16Unorm => 2,
            Rgba16Float => 8,
            Rgba32Float => 16,
            R32Float | R32Uint | Rgba8Unorm | Rgba8UnormSrgb | Bgra8Unorm | Bgra8UnormSrgb
            | Depth24PlusStencil8 | Depth32Float => 4,
        }
    }
}

bitflags! {
    /// How a texture may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        /// Required for [`Texture::write`](crate::Texture::write).
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const STORAGE_BINDING = 1 << 3;
        /// Required for render pass color and depth attachments.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parameters for [`ResourceManager::create_texture`](crate::ResourceManager::create_texture).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: Extent3d,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// Must be at least 1.
    pub mip_level_count: u32,
    /// Must be at least 1.
    pub sample_count: u32,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            format,
            usage,
            mip_level_count: 1,
            sample_count: 1,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Byte size of mip level 0, the amount [`Texture::write`](crate::Texture::write)
    /// expects. `None` if it does not fit in a `u64`.
    pub fn base_level_size(&self) -> Option<u64> {
        self.size
            .texel_count()?
            .checked_mul(u64::from(self.format.block_size()))
    }
}
