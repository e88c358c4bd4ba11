//! Shader and pipeline descriptors.

use super::TextureFormat;

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

/// Type of resource expected at a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform buffer.
    UniformBuffer,
    /// Storage buffer.
    StorageBuffer,
    /// Sampled texture.
    Texture,
    /// Texture sampler.
    Sampler,
}

/// A single binding slot in a bind group layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// Binding index within the group.
    pub binding: u32,
    /// Type of resource expected at this binding.
    pub binding_type: BindingType,
    /// Shader stages that can access this binding.
    pub visibility: ShaderStages,
}

impl BindGroupLayoutEntry {
    pub fn new(binding: u32, binding_type: BindingType) -> Self {
        Self {
            binding,
            binding_type,
            visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        }
    }

    /// Set the shader stage visibility.
    pub fn with_visibility(mut self, visibility: ShaderStages) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Explicit layout of one bind group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindGroupLayoutDescriptor {
    pub label: Option<String>,
    pub entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayoutDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding entry to the layout.
    pub fn with_entry(mut self, entry: BindGroupLayoutEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Add a uniform buffer binding.
    pub fn with_uniform_buffer(self, binding: u32) -> Self {
        self.with_entry(BindGroupLayoutEntry::new(binding, BindingType::UniformBuffer))
    }

    /// Add a texture binding.
    pub fn with_texture(self, binding: u32) -> Self {
        self.with_entry(BindGroupLayoutEntry::new(binding, BindingType::Texture))
    }

    /// Add a sampler binding.
    pub fn with_sampler(self, binding: u32) -> Self {
        self.with_entry(BindGroupLayoutEntry::new(binding, BindingType::Sampler))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One programmable stage of a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStageDescriptor {
    /// WGSL source code.
    pub source: String,
    /// Entry point function name.
    pub entry_point: String,
    /// Label used both for diagnostics and as part of the module cache key.
    pub label: Option<String>,
}

impl ShaderStageDescriptor {
    pub fn new(source: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Descriptor for creating a render pipeline.
///
/// When `bind_group_layouts` is `None` the layouts are inferred from the
/// shaders by the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub vertex: ShaderStageDescriptor,
    pub fragment: Option<ShaderStageDescriptor>,
    pub bind_group_layouts: Option<Vec<BindGroupLayoutDescriptor>>,
    pub topology: PrimitiveTopology,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

impl RenderPipelineDescriptor {
    pub fn new(vertex: ShaderStageDescriptor) -> Self {
        Self {
            label: None,
            vertex,
            fragment: None,
            bind_group_layouts: None,
            topology: PrimitiveTopology::default(),
            color_formats: Vec::new(),
            depth_format: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the fragment stage and the format of its single color target.
    pub fn with_fragment(mut self, fragment: ShaderStageDescriptor, format: TextureFormat) -> Self {
        self.fragment = Some(fragment);
        self.color_formats = vec![format];
        self
    }

    /// Use explicit layouts instead of inferring them.
    pub fn with_bind_group_layouts(mut self, layouts: Vec<BindGroupLayoutDescriptor>) -> Self {
        self.bind_group_layouts = Some(layouts);
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }
}
