//! Common utilities for integration tests.
//!
//! Every test runs against the in-memory `DummyBackend`, whose counters make
//! creation and destruction observable.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use plugin_gpu_host::{
    BufferDescriptor, BufferHandle, BufferUsage, ColorAttachment, DrainPolicy, DummyBackend,
    Engine, EngineConfig, FrameTime, GraphicsResult, HeadlessSurface, ManualFrameScheduler,
    PassDescriptor, PipelineHandle, PluginId, RenderGraphNode, RenderPipelineDescriptor,
    ShaderStageDescriptor, SurfaceId, TextureDescriptor, TextureFormat, TextureHandle,
    TextureUsage,
};

/// Vertex-only shader with no bind groups.
pub const VERTEX_ONLY_SHADER: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(idx) - 1);
    let y = f32(i32(idx & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}
"#;

/// Triangle shader reading a tint from group 0 and a texture from group 1.
pub const TINTED_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> tint: vec4<f32>;
@group(1) @binding(0) var tex: texture_2d<f32>;
@group(1) @binding(1) var samp: sampler;

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(idx) - 1);
    let y = f32(i32(idx & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return tint * textureSample(tex, samp, pos.xy / 64.0);
}
"#;

/// Fragment-less pipeline with no bind groups.
pub fn vertex_only_pipeline() -> RenderPipelineDescriptor {
    RenderPipelineDescriptor::new(ShaderStageDescriptor::new(VERTEX_ONLY_SHADER, "vs_main"))
        .with_label("vertex-only")
}

/// Two-group pipeline rendering to `format`.
pub fn tinted_pipeline(format: TextureFormat) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor::new(ShaderStageDescriptor::new(TINTED_SHADER, "vs_main"))
        .with_fragment(ShaderStageDescriptor::new(TINTED_SHADER, "fs_main"), format)
        .with_label("tinted")
}

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Engine with a manual scheduler and a handle on its backend.
pub struct TestContext {
    pub engine: Engine,
    pub backend: Arc<DummyBackend>,
    pub scheduler: ManualFrameScheduler,
    now: Duration,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default().with_label("test"))
    }

    pub fn with_policy(policy: DrainPolicy) -> Self {
        Self::with_config(
            EngineConfig::default()
                .with_label("test")
                .with_drain_policy(policy),
        )
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_test_logging();
        let backend = Arc::new(DummyBackend::new());
        let scheduler = ManualFrameScheduler::new();
        let engine = Engine::new(backend.clone(), Box::new(scheduler.clone()), config);
        Self {
            engine,
            backend,
            scheduler,
            now: Duration::ZERO,
        }
    }

    /// Register a plugin and return its id.
    pub fn plugin(&mut self, name: &str) -> PluginId {
        let id = PluginId::new(name);
        self.engine.register_plugin(&id).unwrap();
        id
    }

    /// Add and bind a 64x64 headless surface.
    pub fn add_surface(&mut self) -> SurfaceId {
        let surface = HeadlessSurface::new("screen", 64, 64, TextureFormat::Bgra8Unorm).unwrap();
        let id = self.engine.add_surface(Box::new(surface)).unwrap();
        self.engine.bind_surface(id).unwrap();
        id
    }

    /// Fire the pending frame request, advancing the host clock by 16 ms.
    pub fn run_frame<F>(&mut self, body: F) -> GraphicsResult<Option<FrameTime>>
    where
        F: FnOnce(&mut Engine, FrameTime) -> GraphicsResult<()>,
    {
        self.scheduler.take_pending();
        self.now += Duration::from_millis(16);
        self.engine.frame(self.now, body)
    }

    pub fn buffer(&mut self, plugin: &PluginId, size: u64, usage: BufferUsage) -> BufferHandle {
        self.engine
            .plugin(plugin)
            .unwrap()
            .create_buffer(&BufferDescriptor::new(size, usage))
            .unwrap()
    }

    pub fn texture(&mut self, plugin: &PluginId, width: u32, height: u32) -> TextureHandle {
        self.engine
            .plugin(plugin)
            .unwrap()
            .create_texture(&TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
            ))
            .unwrap()
    }

    pub fn pipeline(
        &mut self,
        plugin: &PluginId,
        descriptor: &RenderPipelineDescriptor,
    ) -> PipelineHandle {
        self.engine
            .plugin(plugin)
            .unwrap()
            .create_pipeline(descriptor)
            .unwrap()
    }
}

/// A node that draws one triangle with `pipeline` into the screen.
pub fn draw_node(id: &str, pipeline: PipelineHandle) -> RenderGraphNode {
    let pass = PassDescriptor::new()
        .with_label(id)
        .with_color(ColorAttachment::screen());
    RenderGraphNode::from_fn(id, pass, move |pass, _ctx| {
        pass.set_pipeline(&pipeline)?;
        pass.draw(0..3, 0..1)
    })
}
