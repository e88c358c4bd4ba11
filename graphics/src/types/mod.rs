//! Descriptor and value types shared by the managers and the backend boundary.

mod buffer;
mod common;
mod pipeline;
mod plugin;
mod sampler;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat, MapMode};
pub use common::{Color, Extent3d, LoadOp, ScissorRect, StoreOp, Viewport};
pub use pipeline::{
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType, PrimitiveTopology,
    RenderPipelineDescriptor, ShaderStageDescriptor, ShaderStages,
};
pub use plugin::PluginId;
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
