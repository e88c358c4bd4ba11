//! Dummy GPU backend for testing and development.
//!
//! This backend keeps buffer and texture contents in memory, validates WGSL
//! through `naga` and counts every native call, so lifecycle guarantees such as
//! "destroyed exactly once" can be asserted without GPU hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use naga::valid::{Capabilities, ValidationFlags, Validator};
use parking_lot::Mutex;

use crate::command::{Command, CommandBuffer};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{
    BindGroupLayoutDescriptor, BufferDescriptor, SamplerDescriptor, TextureDescriptor,
};

use super::{
    CompilationMessage, GpuBackend, GpuBindGroupLayout, GpuBuffer, GpuRenderPipeline, GpuSampler,
    GpuShaderModule, GpuTexture, MessageSeverity, RenderPipelineCreateInfo, ShaderCompilation,
};

/// Snapshot of the dummy device's call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyStats {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub samplers_created: u64,
    pub shader_compilations: u64,
    pub bind_group_layouts_created: u64,
    pub pipelines_created: u64,
    pub submissions: u64,
    pub command_buffers_submitted: u64,
    pub commands_submitted: u64,
    pub draw_calls_submitted: u64,
    /// Destroy calls for objects that were not alive.
    pub double_destroys: u64,
}

#[derive(Default)]
struct Counters {
    buffers_created: AtomicU64,
    buffers_destroyed: AtomicU64,
    textures_created: AtomicU64,
    textures_destroyed: AtomicU64,
    samplers_created: AtomicU64,
    shader_compilations: AtomicU64,
    bind_group_layouts_created: AtomicU64,
    pipelines_created: AtomicU64,
    submissions: AtomicU64,
    command_buffers_submitted: AtomicU64,
    commands_submitted: AtomicU64,
    draw_calls_submitted: AtomicU64,
    double_destroys: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct ModuleInfo {
    entry_points: Vec<(String, naga::ShaderStage)>,
    /// Highest `@group` index used plus one.
    group_count: u32,
    valid: bool,
}

#[derive(Default)]
struct DeviceState {
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    /// Base level byte size per texture; uploads are checked, not stored.
    textures: HashMap<u64, u64>,
    // Modules, layouts and pipelines have no destroy call on the backend and
    // are retained until the device itself is destroyed.
    modules: HashMap<u64, ModuleInfo>,
    layouts: HashMap<u64, usize>,
    pipelines: HashMap<u64, Vec<u64>>,
    fail_next: Option<String>,
    queued_messages: Vec<CompilationMessage>,
    lost: Option<String>,
}

impl DeviceState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_alive(&self) -> GraphicsResult<()> {
        match &self.lost {
            Some(reason) => Err(GraphicsError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn take_failure(&mut self) -> Option<String> {
        self.fail_next.take()
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    state: Mutex<DeviceState>,
    counters: Counters,
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState::default()),
            counters: Counters::default(),
        }
    }

    /// Snapshot of all call counters.
    pub fn stats(&self) -> DummyStats {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        DummyStats {
            buffers_created: load(&c.buffers_created),
            buffers_destroyed: load(&c.buffers_destroyed),
            textures_created: load(&c.textures_created),
            textures_destroyed: load(&c.textures_destroyed),
            samplers_created: load(&c.samplers_created),
            shader_compilations: load(&c.shader_compilations),
            bind_group_layouts_created: load(&c.bind_group_layouts_created),
            pipelines_created: load(&c.pipelines_created),
            submissions: load(&c.submissions),
            command_buffers_submitted: load(&c.command_buffers_submitted),
            commands_submitted: load(&c.commands_submitted),
            draw_calls_submitted: load(&c.draw_calls_submitted),
            double_destroys: load(&c.double_destroys),
        }
    }

    /// Number of buffers and textures currently alive on the device.
    pub fn live_allocations(&self) -> usize {
        let state = self.state.lock();
        state.buffers.len() + state.textures.len()
    }

    /// Shader modules and pipelines the device is holding. These are only
    /// freed by [`GpuBackend::destroy`].
    pub fn retained_pipeline_objects(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.modules.len(), state.pipelines.len())
    }

    /// Make the next buffer, texture, sampler or pipeline creation fail.
    pub fn fail_next_creation(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    /// Append a message to the next shader compilation's report.
    pub fn queue_compilation_message(&self, message: CompilationMessage) {
        self.state.lock().queued_messages.push(message);
    }

    /// Mark the device as lost.
    pub fn simulate_device_loss(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log::trace!("DummyBackend: simulating device loss: {reason}");
        self.state.lock().lost = Some(reason);
    }

    fn validate_wgsl(source: &str) -> Result<naga::Module, CompilationMessage> {
        let module = naga::front::wgsl::parse_str(source).map_err(|err| {
            let (line, column) = err
                .location(source)
                .map(|loc| (loc.line_number, loc.line_position))
                .unwrap_or((0, 0));
            CompilationMessage::error(err.message(), line, column)
        })?;

        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|err| {
                let (line, column) = err
                    .location(source)
                    .map(|loc| (loc.line_number, loc.line_position))
                    .unwrap_or((0, 0));
                CompilationMessage::error(err.as_inner().to_string(), line, column)
            })?;

        Ok(module)
    }

    fn module_info(module: &naga::Module) -> ModuleInfo {
        let group_count = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| var.binding.as_ref())
            .map(|binding| binding.group + 1)
            .max()
            .unwrap_or(0);
        ModuleInfo {
            entry_points: module
                .entry_points
                .iter()
                .map(|ep| (ep.name.clone(), ep.stage))
                .collect(),
            group_count,
            valid: true,
        }
    }
}

fn check_entry_point(
    state: &DeviceState,
    module: GpuShaderModule,
    entry_point: &str,
    stage: naga::ShaderStage,
) -> GraphicsResult<u32> {
    let info = state.modules.get(&module.raw()).ok_or_else(|| {
        GraphicsError::PipelineCreationFailed(format!("unknown shader module {}", module.raw()))
    })?;
    if !info.valid {
        return Err(GraphicsError::PipelineCreationFailed(
            "shader module failed to compile".into(),
        ));
    }
    if !info
        .entry_points
        .iter()
        .any(|(name, s)| name == entry_point && *s == stage)
    {
        return Err(GraphicsError::PipelineCreationFailed(format!(
            "no {stage:?} entry point named '{entry_point}'"
        )));
    }
    Ok(info.group_count)
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> GraphicsResult<GpuBuffer> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if let Some(reason) = state.take_failure() {
            return Err(GraphicsError::ResourceCreationFailed(reason));
        }
        let id = state.alloc_id();
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        bump(&self.counters.buffers_created);
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::from_raw(id))
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        if self.state.lock().buffers.remove(&buffer.raw()).is_some() {
            bump(&self.counters.buffers_destroyed);
            log::trace!("DummyBackend: destroyed buffer {}", buffer.raw());
        } else {
            bump(&self.counters.double_destroys);
        }
    }

    fn write_buffer(&self, buffer: GpuBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let contents = state
            .buffers
            .get_mut(&buffer.raw())
            .ok_or_else(|| GraphicsError::validation(format!("unknown buffer {}", buffer.raw())))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GraphicsError::validation(format!(
                "write of {} bytes at offset {offset} exceeds buffer size {}",
                data.len(),
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: GpuBuffer, offset: u64, size: u64) -> GraphicsResult<Vec<u8>> {
        let state = self.state.lock();
        state.check_alive()?;
        let contents = state
            .buffers
            .get(&buffer.raw())
            .ok_or_else(|| GraphicsError::validation(format!("unknown buffer {}", buffer.raw())))?;
        let start = offset as usize;
        let end = start + size as usize;
        contents
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| GraphicsError::validation("read range exceeds buffer size"))
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> GraphicsResult<GpuTexture> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if let Some(reason) = state.take_failure() {
            return Err(GraphicsError::ResourceCreationFailed(reason));
        }
        let size = descriptor.base_level_size().ok_or_else(|| {
            GraphicsError::validation(format!("texture {:?} is too large", descriptor.label))
        })?;
        let id = state.alloc_id();
        state.textures.insert(id, size);
        bump(&self.counters.textures_created);
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(GpuTexture::from_raw(id))
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        if self.state.lock().textures.remove(&texture.raw()).is_some() {
            bump(&self.counters.textures_destroyed);
            log::trace!("DummyBackend: destroyed texture {}", texture.raw());
        } else {
            bump(&self.counters.double_destroys);
        }
    }

    fn write_texture(&self, texture: GpuTexture, data: &[u8]) -> GraphicsResult<()> {
        let state = self.state.lock();
        state.check_alive()?;
        let size = *state.textures.get(&texture.raw()).ok_or_else(|| {
            GraphicsError::validation(format!("unknown texture {}", texture.raw()))
        })?;
        if size != data.len() as u64 {
            return Err(GraphicsError::validation(format!(
                "texture upload of {} bytes, expected {size}",
                data.len()
            )));
        }
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<GpuSampler> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if let Some(reason) = state.take_failure() {
            return Err(GraphicsError::ResourceCreationFailed(reason));
        }
        bump(&self.counters.samplers_created);
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        Ok(GpuSampler::from_raw(state.alloc_id()))
    }

    fn compile_shader(
        &self,
        source: &str,
        label: Option<&str>,
    ) -> GraphicsResult<ShaderCompilation> {
        self.state.lock().check_alive()?;
        bump(&self.counters.shader_compilations);
        log::trace!("DummyBackend: compiling shader {label:?}");

        let (mut info, mut messages) = match Self::validate_wgsl(source) {
            Ok(module) => (Self::module_info(&module), Vec::new()),
            Err(message) => (
                ModuleInfo {
                    entry_points: Vec::new(),
                    group_count: 0,
                    valid: false,
                },
                vec![message],
            ),
        };

        let mut state = self.state.lock();
        messages.append(&mut state.queued_messages);
        if messages
            .iter()
            .any(|m| m.severity == MessageSeverity::Error)
        {
            info.valid = false;
        }
        let id = state.alloc_id();
        state.modules.insert(id, info);
        Ok(ShaderCompilation {
            module: GpuShaderModule::from_raw(id),
            messages,
        })
    }

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> GraphicsResult<GpuBindGroupLayout> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state.alloc_id();
        state.layouts.insert(id, descriptor.entries.len());
        bump(&self.counters.bind_group_layouts_created);
        Ok(GpuBindGroupLayout::from_raw(id))
    }

    fn create_render_pipeline(
        &self,
        info: &RenderPipelineCreateInfo<'_>,
    ) -> GraphicsResult<GpuRenderPipeline> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if let Some(reason) = state.take_failure() {
            return Err(GraphicsError::PipelineCreationFailed(reason));
        }

        let mut group_count = check_entry_point(
            &state,
            info.vertex_module,
            info.vertex_entry_point,
            naga::ShaderStage::Vertex,
        )?;
        if let Some((module, entry)) = info.fragment {
            let fragment_groups =
                check_entry_point(&state, module, entry, naga::ShaderStage::Fragment)?;
            group_count = group_count.max(fragment_groups);
        }

        let layouts = match info.bind_group_layouts {
            Some(explicit) => {
                if let Some(missing) = explicit
                    .iter()
                    .find(|layout| !state.layouts.contains_key(&layout.raw()))
                {
                    return Err(GraphicsError::PipelineCreationFailed(format!(
                        "unknown bind group layout {}",
                        missing.raw()
                    )));
                }
                explicit.iter().map(|layout| layout.raw()).collect()
            }
            None => {
                let mut inferred = Vec::with_capacity(group_count as usize);
                for _ in 0..group_count {
                    let id = state.alloc_id();
                    state.layouts.insert(id, 0);
                    inferred.push(id);
                }
                inferred
            }
        };

        let id = state.alloc_id();
        state.pipelines.insert(id, layouts);
        bump(&self.counters.pipelines_created);
        log::trace!("DummyBackend: creating render pipeline {:?}", info.label);
        Ok(GpuRenderPipeline::from_raw(id))
    }

    fn pipeline_bind_group_layout(
        &self,
        pipeline: GpuRenderPipeline,
        index: u32,
    ) -> GraphicsResult<GpuBindGroupLayout> {
        let state = self.state.lock();
        state.check_alive()?;
        state
            .pipelines
            .get(&pipeline.raw())
            .and_then(|layouts| layouts.get(index as usize))
            .map(|&id| GpuBindGroupLayout::from_raw(id))
            .ok_or_else(|| {
                GraphicsError::validation(format!(
                    "pipeline {} has no bind group {index}",
                    pipeline.raw()
                ))
            })
    }

    fn submit(&self, command_buffers: &[CommandBuffer]) -> GraphicsResult<()> {
        self.state.lock().check_alive()?;
        bump(&self.counters.submissions);
        for buffer in command_buffers {
            bump(&self.counters.command_buffers_submitted);
            for command in buffer.commands() {
                bump(&self.counters.commands_submitted);
                if matches!(command, Command::Draw { .. } | Command::DrawIndexed { .. }) {
                    bump(&self.counters.draw_calls_submitted);
                }
            }
            log::trace!(
                "DummyBackend: submitted command buffer {:?} ({} commands)",
                buffer.label(),
                buffer.commands().len()
            );
        }
        Ok(())
    }

    fn poll_device_lost(&self) -> Option<String> {
        self.state.lock().lost.clone()
    }

    fn destroy(&self) {
        let mut state = self.state.lock();
        if state.lost.is_none() {
            state.lost = Some("device destroyed".into());
        }
        state.buffers.clear();
        state.textures.clear();
        state.modules.clear();
        state.layouts.clear();
        state.pipelines.clear();
        log::trace!("DummyBackend: device destroyed");
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}
