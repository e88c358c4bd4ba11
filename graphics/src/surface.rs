//! Presentation surface boundary.
//!
//! Acquiring and presenting to a real window is the host's job. The engine only
//! needs three things from a surface: the view to render into this frame, a way
//! to resize it, and a way to tear it down. Hosts implement
//! [`PresentationSurface`] over their windowing stack; [`HeadlessSurface`] is an
//! offscreen implementation for tests and tools.
//!
//! # Example
//!
//! ```ignore
//! let surface = HeadlessSurface::new("main", 1280, 720, TextureFormat::Bgra8Unorm)?;
//! let id = engine.add_surface(Box::new(surface))?;
//! engine.bind_surface(id)?;
//! ```

use std::fmt;

use crate::backend::GpuTexture;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{Extent3d, TextureFormat};

/// Identifier the engine assigns to a tracked surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub(crate) u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// The texture a surface exposes for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceView {
    pub texture: GpuTexture,
    pub format: TextureFormat,
    pub size: Extent3d,
    /// Monotonic acquire counter of the surface.
    pub frame_index: u64,
}

/// A surface the engine can present into.
pub trait PresentationSurface: Send {
    /// Name used in logs.
    fn label(&self) -> &str;

    /// The view to render into for the current frame.
    fn current_view(&mut self) -> GraphicsResult<SurfaceView>;

    /// Reconfigure to a new size.
    fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()>;

    fn size(&self) -> Extent3d;

    fn format(&self) -> TextureFormat;

    /// Release the surface. Must tolerate being called more than once.
    fn dispose(&mut self);
}

// Offscreen views get ids from the top of the range so they never collide
// with backend texture ids.
const HEADLESS_TEXTURE_BASE: u64 = 1 << 63;

/// Offscreen surface that hands out synthetic views.
#[derive(Debug)]
pub struct HeadlessSurface {
    label: String,
    size: Extent3d,
    format: TextureFormat,
    generation: u64,
    acquired: u64,
    disposed: bool,
}

impl HeadlessSurface {
    pub fn new(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> GraphicsResult<Self> {
        let label = label.into();
        if width == 0 || height == 0 {
            return Err(GraphicsError::SurfaceCreationFailed(format!(
                "surface '{label}' needs a non-zero size, got {width}x{height}"
            )));
        }
        if format.is_depth_stencil() {
            return Err(GraphicsError::SurfaceCreationFailed(format!(
                "surface '{label}' cannot use depth format {format:?}"
            )));
        }
        Ok(Self {
            label,
            size: Extent3d::new_2d(width, height),
            format,
            generation: 0,
            acquired: 0,
            disposed: false,
        })
    }

    /// Number of views handed out so far.
    pub fn acquired_count(&self) -> u64 {
        self.acquired
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl PresentationSurface for HeadlessSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn current_view(&mut self) -> GraphicsResult<SurfaceView> {
        if self.disposed {
            return Err(GraphicsError::AlreadyDisposed(format!("surface '{}'", self.label)));
        }
        let view = SurfaceView {
            texture: GpuTexture::from_raw(HEADLESS_TEXTURE_BASE | self.generation),
            format: self.format,
            size: self.size,
            frame_index: self.acquired,
        };
        self.acquired += 1;
        Ok(view)
    }

    fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()> {
        if self.disposed {
            return Err(GraphicsError::AlreadyDisposed(format!("surface '{}'", self.label)));
        }
        if width == 0 || height == 0 {
            return Err(GraphicsError::validation(format!(
                "cannot resize surface '{}' to {width}x{height}",
                self.label
            )));
        }
        self.size = Extent3d::new_2d(width, height);
        self.generation += 1;
        log::debug!("surface '{}' resized to {width}x{height}", self.label);
        Ok(())
    }

    fn size(&self) -> Extent3d {
        self.size
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            log::debug!("surface '{}' disposed", self.label);
        }
    }
}
