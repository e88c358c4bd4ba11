//! Command recording.
//!
//! A [`CommandEncoder`] records copies, clears and render passes into a
//! [`CommandBuffer`]. Every recorded command keeps a [`HandleGuard`] on the
//! objects it uses, so nothing it references can be destroyed before the
//! buffer is submitted or dropped. The guards are attributed to the host, not
//! to any plugin, which keeps plugin teardown accounting exact.
//!
//! [`RenderPassEncoder`] is a scope: dropping it records the end of the pass,
//! whether the pass body finished, returned an error, or panicked.

use std::ops::Range;

use crate::backend::GpuBindGroupLayout;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::HandleGuard;
use crate::pipeline::{Pipeline, PipelineHandle};
use crate::resources::{Buffer, BufferHandle, Sampler, SamplerHandle, Texture, TextureHandle};
use crate::surface::SurfaceView;
use crate::types::{
    BufferUsage, Color, IndexFormat, LoadOp, PluginId, ScissorRect, StoreOp, TextureUsage,
    Viewport,
};

/// Where a render pass attachment writes.
#[derive(Debug, Clone)]
pub enum RenderTarget {
    Texture(TextureHandle),
    Surface(SurfaceView),
}

#[derive(Debug, Clone)]
pub struct RenderPassColorAttachment {
    pub target: RenderTarget,
    pub load: LoadOp<Color>,
    pub store: StoreOp,
}

#[derive(Debug, Clone)]
pub struct RenderPassDepthAttachment {
    pub texture: TextureHandle,
    pub depth_load: LoadOp<f32>,
    pub depth_store: StoreOp,
}

/// Fully resolved render pass description.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<RenderPassColorAttachment>,
    pub depth_stencil: Option<RenderPassDepthAttachment>,
}

/// An attachment as recorded, keeping its texture alive.
#[derive(Debug)]
pub enum RecordedTarget {
    Texture(HandleGuard<Texture>),
    Surface(SurfaceView),
}

#[derive(Debug)]
pub struct RecordedColorAttachment {
    pub target: RecordedTarget,
    pub load: LoadOp<Color>,
    pub store: StoreOp,
}

#[derive(Debug)]
pub struct RecordedDepthAttachment {
    pub texture: HandleGuard<Texture>,
    pub depth_load: LoadOp<f32>,
    pub depth_store: StoreOp,
}

/// One resource bound in a bind group.
#[derive(Debug, Clone, Copy)]
pub enum BindingResource<'a> {
    Buffer {
        buffer: &'a BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(&'a TextureHandle),
    Sampler(&'a SamplerHandle),
}

#[derive(Debug, Clone, Copy)]
pub struct BindGroupEntry<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

impl<'a> BindGroupEntry<'a> {
    pub fn buffer(binding: u32, buffer: &'a BufferHandle) -> Self {
        Self {
            binding,
            resource: BindingResource::Buffer {
                buffer,
                offset: 0,
                size: None,
            },
        }
    }

    pub fn texture(binding: u32, texture: &'a TextureHandle) -> Self {
        Self {
            binding,
            resource: BindingResource::Texture(texture),
        }
    }

    pub fn sampler(binding: u32, sampler: &'a SamplerHandle) -> Self {
        Self {
            binding,
            resource: BindingResource::Sampler(sampler),
        }
    }
}

/// A bound resource as recorded.
#[derive(Debug)]
pub enum BoundResource {
    Buffer {
        buffer: HandleGuard<Buffer>,
        offset: u64,
        size: Option<u64>,
    },
    Texture(HandleGuard<Texture>),
    Sampler(HandleGuard<Sampler>),
}

/// A recorded GPU command.
#[derive(Debug)]
pub enum Command {
    BeginRenderPass {
        label: Option<String>,
        color_attachments: Vec<RecordedColorAttachment>,
        depth_stencil: Option<RecordedDepthAttachment>,
    },
    EndRenderPass,
    SetPipeline(HandleGuard<Pipeline>),
    SetBindGroup {
        index: u32,
        layout: GpuBindGroupLayout,
        entries: Vec<(u32, BoundResource)>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: HandleGuard<Buffer>,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: HandleGuard<Buffer>,
        format: IndexFormat,
        offset: u64,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    CopyBufferToBuffer {
        source: HandleGuard<Buffer>,
        source_offset: u64,
        destination: HandleGuard<Buffer>,
        destination_offset: u64,
        size: u64,
    },
    ClearBuffer {
        buffer: HandleGuard<Buffer>,
        offset: u64,
        size: Option<u64>,
    },
}

/// Finished, submittable list of commands.
#[derive(Debug)]
pub struct CommandBuffer {
    label: Option<String>,
    commands: Vec<Command>,
    draw_calls: u32,
}

impl CommandBuffer {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Records commands into a [`CommandBuffer`].
#[derive(Debug)]
pub struct CommandEncoder {
    label: Option<String>,
    commands: Vec<Command>,
    draw_calls: u32,
    holder: PluginId,
}

impl CommandEncoder {
    pub fn new(label: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_owned),
            commands: Vec::new(),
            draw_calls: 0,
            holder: PluginId::host(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Draw calls recorded so far.
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferHandle,
        source_offset: u64,
        destination: &BufferHandle,
        destination_offset: u64,
        size: u64,
    ) -> GraphicsResult<()> {
        require_buffer_usage(source, BufferUsage::COPY_SRC)?;
        require_buffer_usage(destination, BufferUsage::COPY_DST)?;
        check_buffer_range(source, source_offset, size)?;
        check_buffer_range(destination, destination_offset, size)?;
        if source.ptr_eq(destination) {
            return Err(GraphicsError::validation(format!(
                "copy source and destination are both {}",
                source.id()
            )));
        }
        let command = Command::CopyBufferToBuffer {
            source: source.guard_for(&self.holder)?,
            source_offset,
            destination: destination.guard_for(&self.holder)?,
            destination_offset,
            size,
        };
        self.commands.push(command);
        Ok(())
    }

    /// Zero `size` bytes (or the rest of the buffer) starting at `offset`.
    pub fn clear_buffer(
        &mut self,
        buffer: &BufferHandle,
        offset: u64,
        size: Option<u64>,
    ) -> GraphicsResult<()> {
        require_buffer_usage(buffer, BufferUsage::COPY_DST)?;
        let len = size.unwrap_or_else(|| buffer.size().saturating_sub(offset));
        check_buffer_range(buffer, offset, len)?;
        let command = Command::ClearBuffer {
            buffer: buffer.guard_for(&self.holder)?,
            offset,
            size,
        };
        self.commands.push(command);
        Ok(())
    }

    /// Open a render pass scope. The pass ends when the returned encoder is
    /// dropped.
    pub fn begin_render_pass(
        &mut self,
        descriptor: &RenderPassDescriptor,
    ) -> GraphicsResult<RenderPassEncoder<'_>> {
        let mut color_attachments = Vec::with_capacity(descriptor.color_attachments.len());
        for attachment in &descriptor.color_attachments {
            let target = match &attachment.target {
                RenderTarget::Texture(texture) => {
                    require_texture_usage(texture, TextureUsage::RENDER_ATTACHMENT)?;
                    if texture.format().is_depth_stencil() {
                        return Err(GraphicsError::validation(format!(
                            "{} has depth format and cannot be a color attachment",
                            texture.id()
                        )));
                    }
                    RecordedTarget::Texture(texture.guard_for(&self.holder)?)
                }
                RenderTarget::Surface(view) => RecordedTarget::Surface(*view),
            };
            color_attachments.push(RecordedColorAttachment {
                target,
                load: attachment.load,
                store: attachment.store,
            });
        }

        let depth_stencil = match &descriptor.depth_stencil {
            Some(depth) => {
                require_texture_usage(&depth.texture, TextureUsage::RENDER_ATTACHMENT)?;
                if !depth.texture.format().is_depth_stencil() {
                    return Err(GraphicsError::validation(format!(
                        "{} is not a depth format",
                        depth.texture.id()
                    )));
                }
                Some(RecordedDepthAttachment {
                    texture: depth.texture.guard_for(&self.holder)?,
                    depth_load: depth.depth_load,
                    depth_store: depth.depth_store,
                })
            }
            None => None,
        };

        if color_attachments.is_empty() && depth_stencil.is_none() {
            return Err(GraphicsError::validation(format!(
                "render pass {:?} has no attachments",
                descriptor.label
            )));
        }

        self.commands.push(Command::BeginRenderPass {
            label: descriptor.label.clone(),
            color_attachments,
            depth_stencil,
        });
        Ok(RenderPassEncoder {
            encoder: self,
            pipeline: None,
            index_buffer: false,
        })
    }

    /// Finish recording.
    pub fn finish(self) -> CommandBuffer {
        CommandBuffer {
            label: self.label,
            commands: self.commands,
            draw_calls: self.draw_calls,
        }
    }
}

/// Records the commands of one render pass.
///
/// Dropping it records `EndRenderPass`.
pub struct RenderPassEncoder<'a> {
    encoder: &'a mut CommandEncoder,
    pipeline: Option<PipelineHandle>,
    index_buffer: bool,
}

impl RenderPassEncoder<'_> {
    pub fn set_pipeline(&mut self, pipeline: &PipelineHandle) -> GraphicsResult<()> {
        let guard = pipeline.guard_for(&self.encoder.holder)?;
        self.encoder.commands.push(Command::SetPipeline(guard));
        self.pipeline = Some(pipeline.clone());
        Ok(())
    }

    /// Bind resources at group `index` of the current pipeline.
    pub fn set_bind_group(&mut self, index: u32, entries: &[BindGroupEntry<'_>]) -> GraphicsResult<()> {
        let Some(pipeline) = &self.pipeline else {
            return Err(GraphicsError::validation(
                "set_bind_group called before set_pipeline",
            ));
        };
        let Some(layout) = pipeline.bind_group_layout(index) else {
            return Err(GraphicsError::validation(format!(
                "bind group index {index} out of range: {} has {} group(s)",
                pipeline.id(),
                pipeline.bind_group_count()
            )));
        };

        let holder = &self.encoder.holder;
        let mut bound = Vec::with_capacity(entries.len());
        for entry in entries {
            let resource = match entry.resource {
                BindingResource::Buffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let len = size.unwrap_or_else(|| buffer.size().saturating_sub(offset));
                    check_buffer_range(buffer, offset, len)?;
                    BoundResource::Buffer {
                        buffer: buffer.guard_for(holder)?,
                        offset,
                        size,
                    }
                }
                BindingResource::Texture(texture) => BoundResource::Texture(texture.guard_for(holder)?),
                BindingResource::Sampler(sampler) => BoundResource::Sampler(sampler.guard_for(holder)?),
            };
            bound.push((entry.binding, resource));
        }

        self.encoder.commands.push(Command::SetBindGroup {
            index,
            layout,
            entries: bound,
        });
        Ok(())
    }

    pub fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: &BufferHandle,
        offset: u64,
    ) -> GraphicsResult<()> {
        require_buffer_usage(buffer, BufferUsage::VERTEX)?;
        check_buffer_range(buffer, offset, 0)?;
        let guard = buffer.guard_for(&self.encoder.holder)?;
        self.encoder.commands.push(Command::SetVertexBuffer {
            slot,
            buffer: guard,
            offset,
        });
        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        buffer: &BufferHandle,
        format: IndexFormat,
        offset: u64,
    ) -> GraphicsResult<()> {
        require_buffer_usage(buffer, BufferUsage::INDEX)?;
        if offset % format.size() != 0 {
            return Err(GraphicsError::validation(format!(
                "index buffer offset {offset} is not aligned to {format:?}"
            )));
        }
        check_buffer_range(buffer, offset, 0)?;
        let guard = buffer.guard_for(&self.encoder.holder)?;
        self.encoder.commands.push(Command::SetIndexBuffer {
            buffer: guard,
            format,
            offset,
        });
        self.index_buffer = true;
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.encoder.commands.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.encoder.commands.push(Command::SetScissorRect(rect));
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> GraphicsResult<()> {
        self.require_pipeline("draw")?;
        self.encoder.commands.push(Command::Draw {
            vertices,
            instances,
        });
        self.encoder.draw_calls += 1;
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> GraphicsResult<()> {
        self.require_pipeline("draw_indexed")?;
        if !self.index_buffer {
            return Err(GraphicsError::validation(
                "draw_indexed called without an index buffer",
            ));
        }
        self.encoder.commands.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
        self.encoder.draw_calls += 1;
        Ok(())
    }

    /// End the pass now instead of at scope exit.
    pub fn end(self) {}

    fn require_pipeline(&self, op: &str) -> GraphicsResult<()> {
        if self.pipeline.is_none() {
            return Err(GraphicsError::validation(format!(
                "{op} called before set_pipeline"
            )));
        }
        Ok(())
    }
}

impl Drop for RenderPassEncoder<'_> {
    fn drop(&mut self) {
        self.encoder.commands.push(Command::EndRenderPass);
    }
}

fn require_buffer_usage(buffer: &BufferHandle, usage: BufferUsage) -> GraphicsResult<()> {
    if !buffer.usage().contains(usage) {
        return Err(GraphicsError::validation(format!(
            "{} lacks {usage:?} usage",
            buffer.id()
        )));
    }
    Ok(())
}

fn require_texture_usage(texture: &TextureHandle, usage: TextureUsage) -> GraphicsResult<()> {
    if !texture.usage().contains(usage) {
        return Err(GraphicsError::validation(format!(
            "{} lacks {usage:?} usage",
            texture.id()
        )));
    }
    Ok(())
}

fn check_buffer_range(buffer: &BufferHandle, offset: u64, len: u64) -> GraphicsResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(GraphicsError::validation(format!(
            "range {offset}..+{len} is outside {} of size {}",
            buffer.id(),
            buffer.size()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::DrainPolicy;
    use crate::pipeline::PipelineRegistry;
    use crate::resources::ResourceManager;
    use crate::types::{
        BufferDescriptor, RenderPipelineDescriptor, ShaderStageDescriptor, TextureDescriptor,
        TextureFormat,
    };
    use std::sync::Arc;

    const SHADER: &str = r#"
@group(0) @binding(0) var<uniform> tint: vec4<f32>;

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(f32(idx), 0.0, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return tint;
}
"#;

    struct Fixture {
        resources: ResourceManager,
        pipelines: PipelineRegistry,
        plugin: PluginId,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(DummyBackend::new());
        Fixture {
            resources: ResourceManager::new(backend.clone(), DrainPolicy::Force),
            pipelines: PipelineRegistry::new(backend, 4, DrainPolicy::Force),
            plugin: PluginId::new("p"),
        }
    }

    fn color_target(f: &Fixture) -> TextureHandle {
        f.resources
            .create_texture(
                &f.plugin,
                &TextureDescriptor::new_2d(
                    16,
                    16,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::RENDER_ATTACHMENT,
                ),
            )
            .unwrap()
    }

    fn pass_for(target: &TextureHandle) -> RenderPassDescriptor {
        RenderPassDescriptor {
            label: Some("test".into()),
            color_attachments: vec![RenderPassColorAttachment {
                target: RenderTarget::Texture(target.clone()),
                load: LoadOp::Clear(Color::BLACK),
                store: StoreOp::Store,
            }],
            depth_stencil: None,
        }
    }

    fn pipeline(f: &Fixture) -> PipelineHandle {
        let desc = RenderPipelineDescriptor::new(ShaderStageDescriptor::new(SHADER, "vs_main"))
            .with_fragment(
                ShaderStageDescriptor::new(SHADER, "fs_main"),
                TextureFormat::Rgba8Unorm,
            );
        f.pipelines.create_pipeline(&f.plugin, &desc).unwrap()
    }

    #[test]
    fn test_pass_scope_records_end() {
        let f = fixture();
        let target = color_target(&f);
        let pipeline = pipeline(&f);
        let mut encoder = CommandEncoder::new(Some("frame"));
        {
            let mut pass = encoder.begin_render_pass(&pass_for(&target)).unwrap();
            pass.set_pipeline(&pipeline).unwrap();
            pass.draw(0..3, 0..1).unwrap();
        }
        assert_eq!(encoder.draw_calls(), 1);
        let buffer = encoder.finish();
        assert!(matches!(buffer.commands().last(), Some(Command::EndRenderPass)));
        assert_eq!(buffer.commands().len(), 4);
    }

    #[test]
    fn test_recorded_commands_hold_references() {
        let f = fixture();
        let target = color_target(&f);
        let mut encoder = CommandEncoder::new(None);
        encoder.begin_render_pass(&pass_for(&target)).unwrap().end();

        target.release();
        assert!(!target.is_disposed());
        assert_eq!(target.held_by(&PluginId::host()), 1);

        drop(encoder.finish());
        assert!(target.is_disposed());
    }

    #[test]
    fn test_bind_group_index_validated() {
        let f = fixture();
        let target = color_target(&f);
        let pipeline = pipeline(&f);
        let uniform = f
            .resources
            .create_buffer(&f.plugin, &BufferDescriptor::new(16, BufferUsage::UNIFORM))
            .unwrap();
        let mut encoder = CommandEncoder::new(None);
        let mut pass = encoder.begin_render_pass(&pass_for(&target)).unwrap();

        assert!(pass
            .set_bind_group(0, &[BindGroupEntry::buffer(0, &uniform)])
            .unwrap_err()
            .is_validation());
        pass.set_pipeline(&pipeline).unwrap();
        pass.set_bind_group(0, &[BindGroupEntry::buffer(0, &uniform)])
            .unwrap();
        let err = pass
            .set_bind_group(1, &[BindGroupEntry::buffer(0, &uniform)])
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_draw_requires_pipeline_and_index_buffer() {
        let f = fixture();
        let target = color_target(&f);
        let mut encoder = CommandEncoder::new(None);
        let mut pass = encoder.begin_render_pass(&pass_for(&target)).unwrap();
        assert!(pass.draw(0..3, 0..1).is_err());
        pass.set_pipeline(&pipeline(&f)).unwrap();
        assert!(pass.draw_indexed(0..3, 0, 0..1).is_err());
    }

    #[test]
    fn test_copy_validates_usage_and_range() {
        let f = fixture();
        let src = f
            .resources
            .create_buffer(&f.plugin, &BufferDescriptor::new(16, BufferUsage::COPY_SRC))
            .unwrap();
        let dst = f
            .resources
            .create_buffer(&f.plugin, &BufferDescriptor::new(8, BufferUsage::COPY_DST))
            .unwrap();
        let mut encoder = CommandEncoder::new(None);
        assert!(encoder.copy_buffer_to_buffer(&dst, 0, &src, 0, 4).is_err());
        assert!(encoder.copy_buffer_to_buffer(&src, 0, &dst, 4, 8).is_err());
        encoder.copy_buffer_to_buffer(&src, 8, &dst, 0, 8).unwrap();
        encoder.clear_buffer(&dst, 0, None).unwrap();
        assert_eq!(encoder.command_count(), 2);
    }

    #[test]
    fn test_disposed_handles_cannot_be_recorded() {
        let f = fixture();
        let target = color_target(&f);
        target.release();
        let mut encoder = CommandEncoder::new(None);
        assert!(matches!(
            encoder.begin_render_pass(&pass_for(&target)),
            Err(GraphicsError::AlreadyDisposed(_))
        ));
    }
}
