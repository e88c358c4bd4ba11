//! Pass descriptions and pass callbacks.

use crate::command::{
    RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor, RenderPassEncoder,
    RenderTarget,
};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::TextureHandle;
use crate::scheduler::FrameTime;
use crate::surface::{PresentationSurface, SurfaceView};
use crate::types::{Color, Extent3d, LoadOp, StoreOp};

/// What a color attachment renders into.
#[derive(Debug, Clone)]
pub enum AttachmentView {
    /// The bound presentation surface, resolved when the pass executes.
    Screen,
    Texture(TextureHandle),
}

#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: AttachmentView,
    pub load: LoadOp<Color>,
    pub store: StoreOp,
}

impl ColorAttachment {
    /// Render into the bound surface.
    pub fn screen() -> Self {
        Self {
            view: AttachmentView::Screen,
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    pub fn texture(texture: TextureHandle) -> Self {
        Self {
            view: AttachmentView::Texture(texture),
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    pub fn with_clear(mut self, color: Color) -> Self {
        self.load = LoadOp::Clear(color);
        self
    }

    pub fn with_store(mut self, store: StoreOp) -> Self {
        self.store = store;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DepthStencilAttachment {
    pub texture: TextureHandle,
    pub depth_load: LoadOp<f32>,
    pub depth_store: StoreOp,
}

impl DepthStencilAttachment {
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            depth_load: LoadOp::Clear(1.0),
            depth_store: StoreOp::Store,
        }
    }
}

/// Attachments of a graph node's render pass.
#[derive(Debug, Clone, Default)]
pub struct PassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil: Option<DepthStencilAttachment>,
}

impl PassDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_stencil(mut self, attachment: DepthStencilAttachment) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }

    /// True if any color attachment targets the screen.
    pub fn uses_screen(&self) -> bool {
        self.color_attachments
            .iter()
            .any(|a| matches!(a.view, AttachmentView::Screen))
    }

    /// Resolve into an encoder descriptor. `Screen` attachments take the
    /// surface's current view; without a surface they are an error.
    pub(crate) fn resolve(
        &self,
        mut surface: Option<&mut (dyn PresentationSurface + '_)>,
    ) -> GraphicsResult<(RenderPassDescriptor, Option<Extent3d>)> {
        let mut screen: Option<SurfaceView> = None;
        let mut target_size = None;
        let mut color_attachments = Vec::with_capacity(self.color_attachments.len());

        for attachment in &self.color_attachments {
            let target = match &attachment.view {
                AttachmentView::Texture(texture) => {
                    target_size.get_or_insert(texture.size());
                    RenderTarget::Texture(texture.clone())
                }
                AttachmentView::Screen => {
                    let view = match screen {
                        Some(view) => view,
                        None => {
                            let Some(surface) = surface.as_deref_mut() else {
                                return Err(GraphicsError::validation(format!(
                                    "pass {:?} renders to the screen but no surface is bound",
                                    self.label
                                )));
                            };
                            let view = surface.current_view()?;
                            screen = Some(view);
                            view
                        }
                    };
                    target_size.get_or_insert(view.size);
                    RenderTarget::Surface(view)
                }
            };
            color_attachments.push(RenderPassColorAttachment {
                target,
                load: attachment.load,
                store: attachment.store,
            });
        }

        let depth_stencil = self.depth_stencil.as_ref().map(|depth| {
            target_size.get_or_insert(depth.texture.size());
            RenderPassDepthAttachment {
                texture: depth.texture.clone(),
                depth_load: depth.depth_load,
                depth_store: depth.depth_store,
            }
        });

        let descriptor = RenderPassDescriptor {
            label: self.label.clone(),
            color_attachments,
            depth_stencil,
        };
        Ok((descriptor, target_size))
    }
}

/// What a pass callback can see besides its encoder.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub graph_id: &'a str,
    pub node_id: &'a str,
    pub time: FrameTime,
    /// Size of the first attachment.
    pub target_size: Option<Extent3d>,
}

/// The body of a graph node, run inside its render pass.
pub trait RenderNode: Send {
    fn execute(
        &mut self,
        pass: &mut RenderPassEncoder<'_>,
        ctx: &PassContext<'_>,
    ) -> GraphicsResult<()>;
}

impl<F> RenderNode for F
where
    F: FnMut(&mut RenderPassEncoder<'_>, &PassContext<'_>) -> GraphicsResult<()> + Send,
{
    fn execute(
        &mut self,
        pass: &mut RenderPassEncoder<'_>,
        ctx: &PassContext<'_>,
    ) -> GraphicsResult<()> {
        self(pass, ctx)
    }
}
