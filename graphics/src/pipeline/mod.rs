//! Render pipelines and the registry that owns them.
//!
//! [`PipelineRegistry::create_pipeline`] resolves both shader stages through the
//! shared [`ShaderCache`], then either builds the explicit bind group layouts
//! from the descriptor or asks the device for the layouts it inferred from the
//! shaders. Inference tries group indices upward from zero and stops at the
//! first index the pipeline does not have, bounded by
//! [`EngineConfig::max_inferred_bind_groups`](crate::EngineConfig).
//!
//! Pipelines have no native destroy call; disposing a pipeline handle only
//! removes it from the registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuBindGroupLayout, GpuRenderPipeline, RenderPipelineCreateInfo};
use crate::config::DrainPolicy;
use crate::error::{GraphicsError, GraphicsResult, ShaderDiagnostic};
use crate::handle::{
    DisposeHook, Handle, HandleId, HandleIdAllocator, HandleInfo, HandleMap, ResourceKind,
    drain_map, force_drain_all, snapshot,
};
use crate::shader::{self, ShaderCache, ShaderModule};
use crate::types::{
    PluginId, PrimitiveTopology, RenderPipelineDescriptor, ShaderStageDescriptor, TextureFormat,
};

/// Reference-counted pipeline handle.
pub type PipelineHandle = Handle<Pipeline>;

/// A compiled render pipeline.
pub struct Pipeline {
    label: Option<String>,
    native: GpuRenderPipeline,
    bind_group_layouts: Vec<GpuBindGroupLayout>,
    topology: PrimitiveTopology,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    // Held so the modules outlive a shader cache clear.
    vertex: Arc<ShaderModule>,
    fragment: Option<Arc<ShaderModule>>,
}

impl Pipeline {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn native(&self) -> GpuRenderPipeline {
        self.native
    }

    /// Bind group layouts in group-index order.
    pub fn bind_group_layouts(&self) -> &[GpuBindGroupLayout] {
        &self.bind_group_layouts
    }

    pub fn bind_group_count(&self) -> u32 {
        self.bind_group_layouts.len() as u32
    }

    pub fn bind_group_layout(&self, index: u32) -> Option<GpuBindGroupLayout> {
        self.bind_group_layouts.get(index as usize).copied()
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn color_formats(&self) -> &[TextureFormat] {
        &self.color_formats
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_format
    }

    pub fn vertex_module(&self) -> &Arc<ShaderModule> {
        &self.vertex
    }

    pub fn fragment_module(&self) -> Option<&Arc<ShaderModule>> {
        self.fragment.as_ref()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("label", &self.label)
            .field("native", &self.native)
            .field("bind_groups", &self.bind_group_layouts.len())
            .finish()
    }
}

/// Shader cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

struct RegistryShared {
    backend: Arc<dyn GpuBackend>,
    ids: HandleIdAllocator,
    pipelines: HandleMap<Pipeline>,
    shaders: Mutex<ShaderCache>,
    max_inferred_bind_groups: u32,
    drain_policy: DrainPolicy,
    disposed: AtomicBool,
}

impl DisposeHook<Pipeline> for RegistryShared {
    fn on_dispose(&self, id: HandleId, _pipeline: &Pipeline) {
        self.pipelines.lock().remove(&id);
        log::trace!("PipelineRegistry: dropped {id}");
    }
}

/// Compiles shaders and owns every render pipeline.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct PipelineRegistry {
    shared: Arc<RegistryShared>,
}

static_assertions::assert_impl_all!(PipelineRegistry: Send, Sync);

impl PipelineRegistry {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        max_inferred_bind_groups: u32,
        drain_policy: DrainPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                backend,
                ids: HandleIdAllocator::default(),
                pipelines: Mutex::new(BTreeMap::new()),
                shaders: Mutex::new(ShaderCache::new()),
                max_inferred_bind_groups,
                drain_policy,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Compile a shader without consulting the cache.
    pub fn compile_shader(&self, source: &str, label: Option<&str>) -> GraphicsResult<ShaderModule> {
        self.check_alive()?;
        shader::compile(self.shared.backend.as_ref(), source, label)
    }

    /// Cached compile keyed by `(source, label)`.
    pub fn get_or_create_shader_module(
        &self,
        source: &str,
        label: Option<&str>,
    ) -> GraphicsResult<Arc<ShaderModule>> {
        self.check_alive()?;
        self.shared
            .shaders
            .lock()
            .get_or_compile(self.shared.backend.as_ref(), source, label)
    }

    /// Build a render pipeline owned by `owner`.
    ///
    /// Shader errors from both stages are reported together.
    pub fn create_pipeline(
        &self,
        owner: &PluginId,
        descriptor: &RenderPipelineDescriptor,
    ) -> GraphicsResult<PipelineHandle> {
        self.check_alive()?;
        if descriptor.fragment.is_some() && descriptor.color_formats.is_empty() {
            return Err(GraphicsError::validation(format!(
                "pipeline {:?} has a fragment stage but no color targets",
                descriptor.label
            )));
        }

        let mut errors = Vec::new();
        let vertex = self.stage_module(&descriptor.vertex, &mut errors)?;
        let fragment = match &descriptor.fragment {
            Some(stage) => self.stage_module(stage, &mut errors)?,
            None => None,
        };
        if !errors.is_empty() {
            return Err(GraphicsError::ShaderCompilationFailed {
                label: descriptor
                    .label
                    .clone()
                    .unwrap_or_else(|| "<unnamed pipeline>".into()),
                errors,
            });
        }
        let Some(vertex) = vertex else {
            return Err(GraphicsError::PipelineCreationFailed(
                "vertex stage did not produce a module".into(),
            ));
        };

        let backend = &self.shared.backend;
        let explicit_layouts = match &descriptor.bind_group_layouts {
            Some(layouts) => Some(
                layouts
                    .iter()
                    .map(|layout| backend.create_bind_group_layout(layout))
                    .collect::<GraphicsResult<Vec<_>>>()?,
            ),
            None => None,
        };

        let native = backend.create_render_pipeline(&RenderPipelineCreateInfo {
            label: descriptor.label.as_deref(),
            vertex_module: vertex.native(),
            vertex_entry_point: &descriptor.vertex.entry_point,
            fragment: fragment.as_ref().zip(descriptor.fragment.as_ref()).map(
                |(module, stage)| (module.native(), stage.entry_point.as_str()),
            ),
            bind_group_layouts: explicit_layouts.as_deref(),
            topology: descriptor.topology,
            color_formats: &descriptor.color_formats,
            depth_format: descriptor.depth_format,
        })?;

        let bind_group_layouts = match explicit_layouts {
            Some(layouts) => layouts,
            None => self.infer_layouts(native),
        };

        let id = self.shared.ids.next(ResourceKind::Pipeline);
        let pipeline = Pipeline {
            label: descriptor.label.clone(),
            native,
            bind_group_layouts,
            topology: descriptor.topology,
            color_formats: descriptor.color_formats.clone(),
            depth_format: descriptor.depth_format,
            vertex,
            fragment,
        };
        log::trace!(
            "PipelineRegistry: created {id} {:?} with {} bind group(s) for '{owner}'",
            descriptor.label,
            pipeline.bind_group_count()
        );
        let hook: Weak<dyn DisposeHook<Pipeline>> = Arc::downgrade(&self.shared) as _;
        let handle = Handle::new(id, owner.clone(), pipeline, hook);
        self.shared.pipelines.lock().insert(id, handle.clone());
        Ok(handle)
    }

    pub fn pipeline(&self, id: HandleId) -> Option<PipelineHandle> {
        self.shared.pipelines.lock().get(&id).cloned()
    }

    /// Live pipelines created by `plugin`, in creation order.
    pub fn plugin_pipelines(&self, plugin: &PluginId) -> Vec<HandleId> {
        self.shared
            .pipelines
            .lock()
            .values()
            .filter(|handle| handle.owner() == plugin)
            .map(Handle::id)
            .collect()
    }

    /// Live, undisposed pipelines created by `plugin`, with their state.
    pub fn plugin_pipeline_entries(&self, plugin: &PluginId) -> Vec<HandleInfo> {
        snapshot(&self.shared.pipelines)
            .into_iter()
            .filter(|handle| handle.owner() == plugin && !handle.is_disposed())
            .map(|handle| handle.info())
            .collect()
    }

    /// Drain every pipeline created by `plugin`, following the same policy as
    /// [`ResourceManager::release_plugin_resources`](crate::ResourceManager::release_plugin_resources).
    pub fn release_plugin_pipelines(&self, plugin: &PluginId) -> usize {
        let disposed = drain_map(&self.shared.pipelines, plugin, self.shared.drain_policy);
        log::debug!("PipelineRegistry: drained {disposed} pipeline(s) of '{plugin}'");
        disposed
    }

    /// Forget every cached shader module. Live pipelines are unaffected.
    pub fn clear_shader_cache(&self) {
        self.shared.shaders.lock().clear();
    }

    pub fn shader_cache_stats(&self) -> ShaderCacheStats {
        let cache = self.shared.shaders.lock();
        ShaderCacheStats {
            entries: cache.len(),
            hits: cache.hits(),
            misses: cache.misses(),
        }
    }

    pub fn pipeline_count(&self) -> usize {
        self.shared.pipelines.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Drop every pipeline and the shader cache. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let remaining = self.pipeline_count();
        force_drain_all(&self.shared.pipelines);
        self.shared.shaders.lock().clear();
        log::info!("PipelineRegistry: disposed ({remaining} pipeline(s) released)");
    }

    /// Resolve one stage through the cache, collecting shader errors instead of
    /// returning them so both stages are reported.
    fn stage_module(
        &self,
        stage: &ShaderStageDescriptor,
        errors: &mut Vec<ShaderDiagnostic>,
    ) -> GraphicsResult<Option<Arc<ShaderModule>>> {
        match self.get_or_create_shader_module(&stage.source, stage.label.as_deref()) {
            Ok(module) => Ok(Some(module)),
            Err(GraphicsError::ShaderCompilationFailed {
                errors: stage_errors,
                ..
            }) => {
                errors.extend(stage_errors);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    fn infer_layouts(&self, pipeline: GpuRenderPipeline) -> Vec<GpuBindGroupLayout> {
        let mut layouts = Vec::new();
        for index in 0..self.shared.max_inferred_bind_groups {
            match self.shared.backend.pipeline_bind_group_layout(pipeline, index) {
                Ok(layout) => layouts.push(layout),
                Err(_) => break,
            }
        }
        layouts
    }

    fn check_alive(&self) -> GraphicsResult<()> {
        if self.is_disposed() {
            return Err(GraphicsError::AlreadyDisposed("pipeline registry".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.pipeline_count())
            .field("shader_cache", &self.shader_cache_stats())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
