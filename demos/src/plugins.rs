//! Demo plugins.
//!
//! Each plugin builds its GPU objects through a [`PluginScope`] and registers
//! one render graph. Reloading a plugin means invalidating it and calling
//! [`DemoPlugin::load`] again.
//!
//! [`PluginScope`]: plugin_gpu_host::PluginScope

use plugin_gpu_host::{
    BindGroupEntry, BufferDescriptor, BufferUsage, Color, ColorAttachment, Engine,
    GraphicsResult, PassDescriptor, PluginId, RenderGraph, RenderGraphNode,
    RenderPipelineDescriptor, SamplerDescriptor, ShaderStageDescriptor, TextureFormat,
};

const BACKGROUND_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> tint: vec4<f32>;

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(idx & 1u) * 4 - 1);
    let y = f32(i32(idx >> 1u) * 4 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return tint;
}
"#;

const OVERLAY_SHADER: &str = r#"
@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(idx) - 1) * 0.5;
    let y = f32(i32(idx & 1u) * 2 - 1) * 0.5;
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return textureSample(tex, samp, fract(pos.xy / 16.0));
}
"#;

/// A plugin the demo host can load and reload.
pub trait DemoPlugin {
    fn id(&self) -> &PluginId;

    /// Create GPU objects and register graphs. Called again after every
    /// invalidation.
    fn load(&mut self, engine: &mut Engine, format: TextureFormat) -> GraphicsResult<()>;
}

/// Clears the screen and fills it with a tinted full-screen triangle.
pub struct BackgroundPlugin {
    id: PluginId,
    tint: [f32; 4],
}

impl BackgroundPlugin {
    pub fn new(tint: [f32; 4]) -> Self {
        Self {
            id: PluginId::new("background"),
            tint,
        }
    }

    pub fn set_tint(&mut self, tint: [f32; 4]) {
        self.tint = tint;
    }
}

impl DemoPlugin for BackgroundPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn load(&mut self, engine: &mut Engine, format: TextureFormat) -> GraphicsResult<()> {
        let bytes: Vec<u8> = self.tint.iter().flat_map(|c| c.to_le_bytes()).collect();
        let mut scope = engine.plugin(&self.id)?;
        let tint = scope.create_buffer_with_data(
            &BufferDescriptor::new(16, BufferUsage::UNIFORM | BufferUsage::COPY_DST)
                .with_label("background tint"),
            &bytes,
        )?;
        let pipeline = scope.create_pipeline(
            &RenderPipelineDescriptor::new(ShaderStageDescriptor::new(BACKGROUND_SHADER, "vs_main"))
                .with_fragment(ShaderStageDescriptor::new(BACKGROUND_SHADER, "fs_main"), format)
                .with_label("background"),
        )?;

        let pass = PassDescriptor::new()
            .with_label("background")
            .with_color(ColorAttachment::screen().with_clear(Color::BLACK));
        let node = RenderGraphNode::from_fn("fill", pass, move |pass, _| {
            pass.set_pipeline(&pipeline)?;
            pass.set_bind_group(0, &[BindGroupEntry::buffer(0, &tint)])?;
            pass.draw(0..3, 0..1)
        });
        scope.register_graph(RenderGraph::new("background").with_node(node))
    }
}

/// Draws a procedurally generated checkerboard over the background.
pub struct OverlayPlugin {
    id: PluginId,
    cell: u32,
}

impl OverlayPlugin {
    pub fn new(cell: u32) -> Self {
        Self {
            id: PluginId::new("overlay"),
            cell: cell.max(1),
        }
    }

    fn checkerboard(&self) -> image::DynamicImage {
        let cell = self.cell;
        let image = image::RgbaImage::from_fn(cell * 8, cell * 8, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([40, 40, 40, 255])
            }
        });
        image::DynamicImage::ImageRgba8(image)
    }
}

impl DemoPlugin for OverlayPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn load(&mut self, engine: &mut Engine, format: TextureFormat) -> GraphicsResult<()> {
        let checkerboard = self.checkerboard();
        let mut scope = engine.plugin(&self.id)?;
        let texture = scope.create_texture_from_image(&checkerboard, Some("checkerboard"))?;
        let sampler = scope.create_sampler(&SamplerDescriptor::linear())?;
        let pipeline = scope.create_pipeline(
            &RenderPipelineDescriptor::new(ShaderStageDescriptor::new(OVERLAY_SHADER, "vs_main"))
                .with_fragment(ShaderStageDescriptor::new(OVERLAY_SHADER, "fs_main"), format)
                .with_label("overlay"),
        )?;

        let pass = PassDescriptor::new()
            .with_label("overlay")
            .with_color(ColorAttachment::screen());
        let node = RenderGraphNode::from_fn("quad", pass, move |pass, _| {
            pass.set_pipeline(&pipeline)?;
            pass.set_bind_group(
                0,
                &[
                    BindGroupEntry::texture(0, &texture),
                    BindGroupEntry::sampler(1, &sampler),
                ],
            )?;
            pass.draw(0..3, 0..1)
        });
        scope.register_graph(RenderGraph::new("overlay").with_node(node))
    }
}
