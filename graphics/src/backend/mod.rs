//! GPU device boundary.
//!
//! The host never talks to a graphics API directly. Everything that touches the
//! device goes through [`GpuBackend`], which deals in opaque native ids. The
//! managers own the lifetimes of those ids; a backend only creates and destroys
//! what it is told to.
//!
//! # Available Backends
//!
//! - [`dummy::DummyBackend`]: in-memory reference device with WGSL validation,
//!   used by tests, benches and the demos.

pub mod dummy;

use crate::command::CommandBuffer;
use crate::error::GraphicsResult;
use crate::types::{
    BindGroupLayoutDescriptor, BufferDescriptor, PrimitiveTopology, SamplerDescriptor,
    TextureDescriptor, TextureFormat,
};

macro_rules! native_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend-specific id.
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

native_id!(
    /// Native buffer object.
    GpuBuffer
);
native_id!(
    /// Native texture object.
    GpuTexture
);
native_id!(
    /// Native sampler object.
    GpuSampler
);
native_id!(
    /// Native compiled shader module.
    GpuShaderModule
);
native_id!(
    /// Native bind group layout.
    GpuBindGroupLayout
);
native_id!(
    /// Native render pipeline.
    GpuRenderPipeline
);

/// Severity of a compiler message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
}

/// One message reported by the shader compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationMessage {
    pub severity: MessageSeverity,
    pub message: String,
    /// 1-based, 0 if unknown.
    pub line: u32,
    /// 1-based, 0 if unknown.
    pub column: u32,
}

impl CompilationMessage {
    pub fn error(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity: MessageSeverity::Error,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn warning(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity: MessageSeverity::Warning,
            message: message.into(),
            line,
            column,
        }
    }
}

/// Outcome of handing source code to the device compiler.
///
/// Like the web model, compilation always yields a module object; whether it is
/// usable is decided by the messages.
#[derive(Debug, Clone)]
pub struct ShaderCompilation {
    pub module: GpuShaderModule,
    pub messages: Vec<CompilationMessage>,
}

/// Native render pipeline creation parameters, with shader modules resolved.
#[derive(Debug, Clone)]
pub struct RenderPipelineCreateInfo<'a> {
    pub label: Option<&'a str>,
    pub vertex_module: GpuShaderModule,
    pub vertex_entry_point: &'a str,
    pub fragment: Option<(GpuShaderModule, &'a str)>,
    /// `None` asks the device to infer layouts from the shaders.
    pub bind_group_layouts: Option<&'a [GpuBindGroupLayout]>,
    pub topology: PrimitiveTopology,
    pub color_formats: &'a [TextureFormat],
    pub depth_format: Option<TextureFormat>,
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GraphicsResult<GpuBuffer>;

    /// Release a buffer's device memory.
    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Write data to a buffer.
    fn write_buffer(&self, buffer: GpuBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()>;

    /// Read data from a buffer.
    fn read_buffer(&self, buffer: GpuBuffer, offset: u64, size: u64) -> GraphicsResult<Vec<u8>>;

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> GraphicsResult<GpuTexture>;

    /// Release a texture's device memory.
    fn destroy_texture(&self, texture: GpuTexture);

    /// Replace the base level of a texture.
    fn write_texture(&self, texture: GpuTexture, data: &[u8]) -> GraphicsResult<()>;

    /// Create a sampler resource. Samplers have no explicit destroy.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<GpuSampler>;

    /// Compile a shader module and report every diagnostic.
    fn compile_shader(&self, source: &str, label: Option<&str>)
    -> GraphicsResult<ShaderCompilation>;

    /// Create an explicit bind group layout.
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> GraphicsResult<GpuBindGroupLayout>;

    /// Create a render pipeline.
    fn create_render_pipeline(
        &self,
        info: &RenderPipelineCreateInfo<'_>,
    ) -> GraphicsResult<GpuRenderPipeline>;

    /// Fetch the layout of bind group `index` from a pipeline.
    ///
    /// Fails when the pipeline has no group at that index.
    fn pipeline_bind_group_layout(
        &self,
        pipeline: GpuRenderPipeline,
        index: u32,
    ) -> GraphicsResult<GpuBindGroupLayout>;

    /// Submit finished command buffers to the queue.
    fn submit(&self, command_buffers: &[CommandBuffer]) -> GraphicsResult<()>;

    /// Returns the loss reason once the device has been lost.
    fn poll_device_lost(&self) -> Option<String>;

    /// Tear down the device. Further calls fail with `DeviceLost`.
    fn destroy(&self);
}
