//! # Plugin GPU Host
//!
//! Shared GPU resource and render-orchestration core for hosts that load
//! several independent rendering plugins into one device.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ResourceManager`] - Reference-counted buffers, textures and samplers, tagged by owning plugin
//! - [`PipelineRegistry`] - Shader compilation with a content-addressed cache, render pipelines
//! - [`RenderGraphExecutor`] - Declarative render graphs, sorted once and executed every frame
//! - [`HotReloadManager`] - Plugin teardown with leak reports
//! - [`Engine`] - Facade tying the above to a frame loop, command submission and surfaces
//! - [`GpuBackend`] - The device boundary, with [`DummyBackend`] as an in-memory reference
//!
//! ## Example
//!
//! ```ignore
//! use plugin_gpu_host::{Engine, EngineConfig, DummyBackend, ManualFrameScheduler, PluginId};
//!
//! let scheduler = ManualFrameScheduler::new();
//! let mut engine = Engine::new(Arc::new(DummyBackend::new()), Box::new(scheduler.clone()), EngineConfig::default());
//! let sky = PluginId::new("sky");
//! engine.register_plugin(&sky)?;
//! let stars = engine.plugin(&sky)?.create_texture(&desc)?;
//!
//! // Reload the plugin's code.
//! let report = engine.invalidate_plugin(&sky)?;
//! assert!(!report.has_leaks);
//! ```

pub mod backend;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod handle;
pub mod hot_reload;
pub mod logging;
pub mod pipeline;
pub mod resources;
pub mod scheduler;
pub mod shader;
pub mod surface;
pub mod types;

// Re-export main types for convenience
pub use backend::GpuBackend;
pub use backend::dummy::{DummyBackend, DummyStats};
pub use command::{
    BindGroupEntry, BindingResource, CommandBuffer, CommandEncoder, RenderPassColorAttachment,
    RenderPassDepthAttachment, RenderPassDescriptor, RenderPassEncoder, RenderTarget,
};
pub use config::{DrainPolicy, EngineConfig};
pub use engine::{EncodeContext, Engine, EngineMetrics, EngineState, PluginScope};
pub use error::{GraphicsError, GraphicsResult, ShaderDiagnostic};
pub use graph::{
    AttachmentView, ColorAttachment, DepthStencilAttachment, PassContext, PassDescriptor,
    RenderGraph, RenderGraphExecutor, RenderGraphNode, RenderNode,
};
pub use handle::{Handle, HandleGuard, HandleId, HandleInfo, ResourceKind};
pub use hot_reload::{HotReloadManager, LeakEntry, LeakReport, PluginSnapshot};
pub use logging::{LoggingConfig, init_logging};
pub use pipeline::{Pipeline, PipelineHandle, PipelineRegistry, ShaderCacheStats};
pub use resources::{
    Buffer, BufferHandle, PluginResources, ResourceManager, Sampler, SamplerHandle, Texture,
    TextureHandle,
};
pub use scheduler::{FrameClock, FrameRequest, FrameScheduler, FrameTime, ManualFrameScheduler};
pub use shader::{ShaderCache, ShaderModule};
pub use surface::{HeadlessSurface, PresentationSurface, SurfaceId, SurfaceView};
pub use types::{
    BufferDescriptor, BufferUsage, Color, Extent3d, IndexFormat, LoadOp, MapMode, PluginId,
    RenderPipelineDescriptor, SamplerDescriptor, ShaderStageDescriptor, StoreOp,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
