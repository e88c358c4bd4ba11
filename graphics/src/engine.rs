//! The engine facade.
//!
//! [`Engine`] composes the resource manager, pipeline registry, graph
//! executor and hot-reload manager with a frame loop, command submission and
//! surface tracking. It is the only type plugin code talks to.
//!
//! # Frame loop
//!
//! ```text
//!  Stopped --start--> Running --pause--> Paused
//!     ^                  |  ^--resume------'
//!     '------stop--------'  (stop from any state)
//! ```
//!
//! While running, the engine keeps exactly one frame request outstanding with
//! its [`FrameScheduler`]. When the host fires it, [`Engine::frame`] ticks the
//! clock, runs the frame body, flushes pending command buffers and requests
//! the next frame.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = Engine::new(backend, Box::new(scheduler.clone()), EngineConfig::default());
//! let plugin = PluginId::new("sky");
//! engine.register_plugin(&plugin)?;
//! let vb = engine.plugin(&plugin)?.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
//!
//! engine.start()?;
//! engine.frame(timestamp, |engine, _time| {
//!     engine.encode("main", |ctx| ctx.execute_all_graphs().map(|_| ()))
//! })?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::GpuBackend;
use crate::command::{CommandBuffer, CommandEncoder, RenderPassDescriptor, RenderPassEncoder};
use crate::config::EngineConfig;
use crate::error::{GraphicsError, GraphicsResult};
use crate::graph::{RenderGraph, RenderGraphExecutor};
use crate::handle::Handle;
use crate::hot_reload::{HotReloadManager, LeakReport};
use crate::pipeline::{PipelineHandle, PipelineRegistry, ShaderCacheStats};
use crate::resources::{BufferHandle, ResourceManager, SamplerHandle, TextureHandle};
use crate::scheduler::{FrameClock, FrameRequest, FrameScheduler, FrameTime};
use crate::shader::ShaderModule;
use crate::surface::{PresentationSurface, SurfaceId};
use crate::types::{
    BufferDescriptor, PluginId, RenderPipelineDescriptor, SamplerDescriptor, TextureDescriptor,
};

/// Frame loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Stopped,
    Running,
    Paused,
    Disposed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Counters describing the engine's current load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineMetrics {
    pub frame_count: u64,
    pub last_frame_draw_calls: u32,
    pub total_draw_calls: u64,
    pub command_buffers_submitted: u64,
    pub pending_command_buffers: usize,
    pub buffers: usize,
    pub textures: usize,
    pub samplers: usize,
    pub pipelines: usize,
    pub estimated_memory_bytes: u64,
    pub shader_cache: ShaderCacheStats,
    pub render_graphs: usize,
    pub passes_executed: u64,
    pub registered_plugins: usize,
    pub surfaces: usize,
}

struct TrackedSurface {
    id: SurfaceId,
    surface: Box<dyn PresentationSurface>,
}

/// Multi-plugin GPU host.
pub struct Engine {
    config: EngineConfig,
    backend: Arc<dyn GpuBackend>,
    resources: ResourceManager,
    pipelines: PipelineRegistry,
    graphs: RenderGraphExecutor,
    hot_reload: HotReloadManager,

    scheduler: Box<dyn FrameScheduler>,
    frame_request: Option<FrameRequest>,
    clock: FrameClock,
    state: EngineState,
    time: FrameTime,

    pending: Vec<CommandBuffer>,
    surfaces: Vec<TrackedSurface>,
    bound_surface: Option<SurfaceId>,
    next_surface_id: u64,

    frame_draw_calls: u32,
    last_frame_draw_calls: u32,
    total_draw_calls: u64,
    command_buffers_submitted: u64,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        scheduler: Box<dyn FrameScheduler>,
        config: EngineConfig,
    ) -> Self {
        let resources = ResourceManager::new(backend.clone(), config.drain_policy);
        let pipelines = PipelineRegistry::new(
            backend.clone(),
            config.max_inferred_bind_groups,
            config.drain_policy,
        );
        let hot_reload = HotReloadManager::new(resources.clone(), pipelines.clone());
        let clock = FrameClock::with_clamps(config.min_frame_delta, config.max_frame_delta);

        log::info!(
            "Engine '{}': created on {} (drain policy {:?})",
            config.label,
            backend.name(),
            config.drain_policy
        );

        Self {
            config,
            backend,
            resources,
            pipelines,
            graphs: RenderGraphExecutor::new(),
            hot_reload,
            scheduler,
            frame_request: None,
            clock,
            state: EngineState::Stopped,
            time: FrameTime::default(),
            pending: Vec::new(),
            surfaces: Vec::new(),
            bound_surface: None,
            next_surface_id: 1,
            frame_draw_calls: 0,
            last_frame_draw_calls: 0,
            total_draw_calls: 0,
            command_buffers_submitted: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == EngineState::Disposed
    }

    // ---- frame loop ----

    /// Begin requesting frames. Only valid while stopped.
    pub fn start(&mut self) -> GraphicsResult<()> {
        self.check_alive()?;
        if self.state != EngineState::Stopped {
            return Err(GraphicsError::validation(format!(
                "cannot start engine '{}' while {}",
                self.config.label, self.state
            )));
        }
        self.clock.reset();
        self.state = EngineState::Running;
        self.request_frame();
        log::info!("Engine '{}': started", self.config.label);
        Ok(())
    }

    /// Stop requesting frames. Valid from any state; stopping twice is a no-op.
    pub fn stop(&mut self) -> GraphicsResult<()> {
        self.check_alive()?;
        if self.state == EngineState::Stopped {
            return Ok(());
        }
        self.cancel_frame();
        self.state = EngineState::Stopped;
        log::info!("Engine '{}': stopped", self.config.label);
        Ok(())
    }

    pub fn pause(&mut self) -> GraphicsResult<()> {
        self.check_alive()?;
        if self.state != EngineState::Running {
            return Err(GraphicsError::validation(format!(
                "cannot pause engine '{}' while {}",
                self.config.label, self.state
            )));
        }
        self.cancel_frame();
        self.state = EngineState::Paused;
        log::info!("Engine '{}': paused", self.config.label);
        Ok(())
    }

    pub fn resume(&mut self) -> GraphicsResult<()> {
        self.check_alive()?;
        if self.state != EngineState::Paused {
            return Err(GraphicsError::validation(format!(
                "cannot resume engine '{}' while {}",
                self.config.label, self.state
            )));
        }
        // The paused interval is not frame time.
        self.clock.reset();
        self.state = EngineState::Running;
        self.request_frame();
        log::info!("Engine '{}': resumed", self.config.label);
        Ok(())
    }

    /// Run one frame at host time `timestamp`.
    ///
    /// Returns `None` when the engine is not running, e.g. for a request that
    /// fired after `pause`. The next frame is requested even when `body`
    /// fails; its error is returned after pending buffers are flushed.
    pub fn frame<F>(&mut self, timestamp: Duration, body: F) -> GraphicsResult<Option<FrameTime>>
    where
        F: FnOnce(&mut Engine, FrameTime) -> GraphicsResult<()>,
    {
        self.check_alive()?;
        self.frame_request = None;
        if self.state != EngineState::Running {
            log::trace!("Engine '{}': frame skipped while {}", self.config.label, self.state);
            return Ok(None);
        }
        self.check_device()?;

        let time = self.clock.tick(timestamp);
        self.time = time;
        self.frame_draw_calls = 0;

        let result = body(self, time);
        if self.is_disposed() {
            return result.map(|()| Some(time));
        }

        let flushed = if self.config.auto_submit {
            self.submit()
        } else {
            Ok(0)
        };
        self.last_frame_draw_calls = self.frame_draw_calls;

        if self.state == EngineState::Running {
            self.request_frame();
        }
        log::trace!(
            "Engine '{}': frame {} done, {} draw call(s)",
            self.config.label,
            time.frame_index,
            self.last_frame_draw_calls
        );

        result?;
        flushed?;
        Ok(Some(time))
    }

    /// Timing of the current (or last) frame.
    pub fn time(&self) -> FrameTime {
        self.time
    }

    // ---- encoding ----

    /// Record one command buffer and queue it for the next [`submit`].
    ///
    /// If `f` fails the partial recording is discarded.
    ///
    /// [`submit`]: Self::submit
    pub fn encode<R, F>(&mut self, label: &str, f: F) -> GraphicsResult<R>
    where
        F: FnOnce(&mut EncodeContext<'_>) -> GraphicsResult<R>,
    {
        self.check_alive()?;
        let mut encoder = CommandEncoder::new(Some(label));
        let bound = self.bound_surface;
        let surface = self
            .surfaces
            .iter_mut()
            .find(|tracked| Some(tracked.id) == bound)
            .map(|tracked| tracked.surface.as_mut() as &mut dyn PresentationSurface);

        let mut ctx = EncodeContext {
            encoder: &mut encoder,
            graphs: &mut self.graphs,
            surface,
            time: self.time,
        };
        let value = f(&mut ctx)?;

        let buffer = encoder.finish();
        self.frame_draw_calls += buffer.draw_calls();
        self.total_draw_calls += u64::from(buffer.draw_calls());
        if buffer.is_empty() {
            log::trace!("Engine '{}': encoding '{label}' recorded nothing", self.config.label);
        } else {
            self.pending.push(buffer);
        }
        Ok(value)
    }

    /// Send every pending command buffer to the device. Returns how many were
    /// submitted.
    pub fn submit(&mut self) -> GraphicsResult<usize> {
        self.check_alive()?;
        if self.pending.is_empty() {
            return Ok(0);
        }
        self.check_device()?;

        let buffers = std::mem::take(&mut self.pending);
        let count = buffers.len();
        if let Err(err) = self.backend.submit(&buffers) {
            if let GraphicsError::DeviceLost(reason) = &err {
                self.handle_device_lost(reason);
            }
            return Err(err);
        }
        self.command_buffers_submitted += count as u64;
        log::trace!("Engine '{}': submitted {count} command buffer(s)", self.config.label);
        Ok(count)
    }

    pub fn pending_command_buffers(&self) -> usize {
        self.pending.len()
    }

    // ---- plugins ----

    pub fn register_plugin(&mut self, plugin: &PluginId) -> GraphicsResult<()> {
        self.check_alive()?;
        self.hot_reload.register_plugin(plugin)
    }

    /// Release everything `plugin` owns, including its render graphs, and
    /// keep it registered for a reload.
    pub fn invalidate_plugin(&mut self, plugin: &PluginId) -> GraphicsResult<LeakReport> {
        self.prepare_teardown(plugin)?;
        self.hot_reload.invalidate_plugin(plugin)
    }

    /// Release everything `plugin` owns and forget it.
    pub fn unregister_plugin(&mut self, plugin: &PluginId) -> GraphicsResult<LeakReport> {
        self.prepare_teardown(plugin)?;
        self.hot_reload.unregister_plugin(plugin)
    }

    /// A creation session attributing new objects to `plugin`.
    pub fn plugin(&mut self, plugin: &PluginId) -> GraphicsResult<PluginScope<'_>> {
        self.check_alive()?;
        if !self.hot_reload.is_registered(plugin) {
            return Err(GraphicsError::validation(format!(
                "plugin '{plugin}' is not registered"
            )));
        }
        Ok(PluginScope {
            engine: self,
            plugin: plugin.clone(),
        })
    }

    pub fn leak_report(&self, plugin: Option<&PluginId>) -> LeakReport {
        self.hot_reload.leak_report(plugin)
    }

    /// Register a graph owned by the host rather than a plugin.
    pub fn register_graph(&mut self, graph: RenderGraph) -> GraphicsResult<()> {
        self.check_alive()?;
        self.graphs.register_graph(graph, None)
    }

    pub fn unregister_graph(&mut self, id: &str) -> GraphicsResult<bool> {
        self.check_alive()?;
        Ok(self.graphs.unregister_graph(id))
    }

    // ---- surfaces ----

    /// Track a surface. The first surface added is bound for presentation.
    pub fn add_surface(&mut self, surface: Box<dyn PresentationSurface>) -> GraphicsResult<SurfaceId> {
        self.check_alive()?;
        let id = SurfaceId(self.next_surface_id);
        self.next_surface_id += 1;
        log::info!(
            "Engine '{}': added {id} '{}' ({}x{})",
            self.config.label,
            surface.label(),
            surface.size().width,
            surface.size().height
        );
        self.surfaces.push(TrackedSurface { id, surface });
        if self.bound_surface.is_none() {
            self.bound_surface = Some(id);
        }
        Ok(id)
    }

    /// Make `id` the surface `Screen` attachments render into.
    pub fn bind_surface(&mut self, id: SurfaceId) -> GraphicsResult<()> {
        self.check_alive()?;
        self.surface_index(id)?;
        self.bound_surface = Some(id);
        Ok(())
    }

    pub fn unbind_surface(&mut self) -> GraphicsResult<()> {
        self.check_alive()?;
        self.bound_surface = None;
        Ok(())
    }

    pub fn bound_surface(&self) -> Option<SurfaceId> {
        self.bound_surface
    }

    pub fn resize_surface(&mut self, id: SurfaceId, width: u32, height: u32) -> GraphicsResult<()> {
        self.check_alive()?;
        let index = self.surface_index(id)?;
        self.surfaces[index].surface.resize(width, height)
    }

    /// Stop tracking a surface and dispose it.
    pub fn remove_surface(&mut self, id: SurfaceId) -> GraphicsResult<()> {
        self.check_alive()?;
        let index = self.surface_index(id)?;
        let mut tracked = self.surfaces.remove(index);
        tracked.surface.dispose();
        if self.bound_surface == Some(id) {
            self.bound_surface = None;
        }
        log::info!("Engine '{}': removed {id}", self.config.label);
        Ok(())
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    // ---- device ----

    /// Tear the engine down after the device was lost.
    pub fn handle_device_lost(&mut self, reason: &str) {
        if self.is_disposed() {
            return;
        }
        log::error!("Engine '{}': device lost: {reason}", self.config.label);
        self.dispose();
    }

    // ---- accessors ----

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    pub fn graphs(&self) -> &RenderGraphExecutor {
        &self.graphs
    }

    pub fn hot_reload(&self) -> &HotReloadManager {
        &self.hot_reload
    }

    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            frame_count: self.clock.frame_count(),
            last_frame_draw_calls: self.last_frame_draw_calls,
            total_draw_calls: self.total_draw_calls,
            command_buffers_submitted: self.command_buffers_submitted,
            pending_command_buffers: self.pending.len(),
            buffers: self.resources.buffer_count(),
            textures: self.resources.texture_count(),
            samplers: self.resources.sampler_count(),
            pipelines: self.pipelines.pipeline_count(),
            estimated_memory_bytes: self.resources.estimated_memory_usage(),
            shader_cache: self.pipelines.shader_cache_stats(),
            render_graphs: self.graphs.graph_count(),
            passes_executed: self.graphs.passes_executed(),
            registered_plugins: self.hot_reload.registered_plugins().len(),
            surfaces: self.surfaces.len(),
        }
    }

    /// Shut everything down. Terminal and idempotent.
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.cancel_frame();

        if !self.pending.is_empty() {
            log::debug!(
                "Engine '{}': dropping {} unsubmitted command buffer(s)",
                self.config.label,
                self.pending.len()
            );
            self.pending.clear();
        }
        for tracked in &mut self.surfaces {
            tracked.surface.dispose();
        }
        self.surfaces.clear();
        self.bound_surface = None;
        self.graphs = RenderGraphExecutor::new();

        self.hot_reload.dispose();
        self.pipelines.dispose();
        self.resources.dispose();
        self.backend.destroy();

        self.state = EngineState::Disposed;
        log::info!("Engine '{}': disposed", self.config.label);
    }

    fn check_alive(&self) -> GraphicsResult<()> {
        if self.is_disposed() {
            return Err(GraphicsError::AlreadyDisposed(format!(
                "engine '{}'",
                self.config.label
            )));
        }
        Ok(())
    }

    fn check_device(&mut self) -> GraphicsResult<()> {
        if let Some(reason) = self.backend.poll_device_lost() {
            self.handle_device_lost(&reason);
            return Err(GraphicsError::DeviceLost(reason));
        }
        Ok(())
    }

    fn prepare_teardown(&mut self, plugin: &PluginId) -> GraphicsResult<()> {
        self.check_alive()?;
        if !self.hot_reload.is_registered(plugin) {
            return Err(GraphicsError::validation(format!(
                "plugin '{plugin}' is not registered"
            )));
        }
        // Queued commands may still reference the plugin's objects.
        self.submit()?;
        self.graphs.unregister_plugin_graphs(plugin);
        Ok(())
    }

    fn request_frame(&mut self) {
        if self.frame_request.is_none() {
            self.frame_request = Some(self.scheduler.request_frame());
        }
    }

    fn cancel_frame(&mut self) {
        if let Some(request) = self.frame_request.take() {
            self.scheduler.cancel_frame(request);
        }
    }

    fn surface_index(&self, id: SurfaceId) -> GraphicsResult<usize> {
        self.surfaces
            .iter()
            .position(|tracked| tracked.id == id)
            .ok_or_else(|| GraphicsError::validation(format!("unknown surface {id}")))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("label", &self.config.label)
            .field("state", &self.state)
            .field("backend", &self.backend.name())
            .field("pending", &self.pending.len())
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}

/// Encoding operations available inside [`Engine::encode`].
pub struct EncodeContext<'a> {
    encoder: &'a mut CommandEncoder,
    graphs: &'a mut RenderGraphExecutor,
    surface: Option<&'a mut dyn PresentationSurface>,
    time: FrameTime,
}

impl EncodeContext<'_> {
    pub fn time(&self) -> FrameTime {
        self.time
    }

    /// Direct access for copies, clears and hand-written passes.
    pub fn encoder(&mut self) -> &mut CommandEncoder {
        &mut *self.encoder
    }

    pub fn begin_render_pass(
        &mut self,
        descriptor: &RenderPassDescriptor,
    ) -> GraphicsResult<RenderPassEncoder<'_>> {
        self.encoder.begin_render_pass(descriptor)
    }

    /// Acquire the bound surface's view for this frame.
    pub fn surface_view(&mut self) -> GraphicsResult<crate::surface::SurfaceView> {
        match self.surface.as_deref_mut() {
            Some(surface) => surface.current_view(),
            None => Err(GraphicsError::validation("no surface is bound")),
        }
    }

    /// Run one registered graph. Returns the number of passes recorded.
    pub fn execute_graph(&mut self, id: &str) -> GraphicsResult<usize> {
        self.graphs
            .execute(id, &mut *self.encoder, self.surface.as_deref_mut(), self.time)
    }

    /// Run every registered graph in registration order.
    pub fn execute_all_graphs(&mut self) -> GraphicsResult<usize> {
        self.graphs
            .execute_all(&mut *self.encoder, self.surface.as_deref_mut(), self.time)
    }
}

/// Creates objects on behalf of one plugin.
///
/// Everything created through a scope is owned by its plugin and released
/// when that plugin is invalidated or unregistered.
pub struct PluginScope<'a> {
    engine: &'a mut Engine,
    plugin: PluginId,
}

impl std::fmt::Debug for PluginScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginScope")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

impl PluginScope<'_> {
    pub fn id(&self) -> &PluginId {
        &self.plugin
    }

    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> GraphicsResult<BufferHandle> {
        self.engine.resources.create_buffer(&self.plugin, descriptor)
    }

    pub fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> GraphicsResult<BufferHandle> {
        self.engine
            .resources
            .create_buffer_with_data(&self.plugin, descriptor, data)
    }

    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> GraphicsResult<TextureHandle> {
        self.engine.resources.create_texture(&self.plugin, descriptor)
    }

    pub fn create_texture_from_image(
        &self,
        image: &image::DynamicImage,
        label: Option<&str>,
    ) -> GraphicsResult<TextureHandle> {
        self.engine
            .resources
            .create_texture_from_image(&self.plugin, image, label)
    }

    pub fn create_texture_from_encoded(
        &self,
        bytes: &[u8],
        label: Option<&str>,
    ) -> GraphicsResult<TextureHandle> {
        self.engine
            .resources
            .create_texture_from_encoded(&self.plugin, bytes, label)
    }

    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> GraphicsResult<SamplerHandle> {
        self.engine.resources.create_sampler(&self.plugin, descriptor)
    }

    pub fn create_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> GraphicsResult<PipelineHandle> {
        self.engine.pipelines.create_pipeline(&self.plugin, descriptor)
    }

    pub fn shader_module(&self, source: &str, label: Option<&str>) -> GraphicsResult<Arc<ShaderModule>> {
        self.engine
            .pipelines
            .get_or_create_shader_module(source, label)
    }

    /// Take a reference on another plugin's object. It is given back when
    /// this plugin is torn down, or through [`release`](Self::release).
    pub fn retain<T: Send + Sync + 'static>(&self, handle: &Handle<T>) -> GraphicsResult<u32> {
        handle.add_ref_for(&self.plugin)
    }

    pub fn release<T: Send + Sync + 'static>(&self, handle: &Handle<T>) -> u32 {
        handle.release_for(&self.plugin)
    }

    /// Register a graph that is removed with this plugin.
    pub fn register_graph(&mut self, graph: RenderGraph) -> GraphicsResult<()> {
        self.engine
            .graphs
            .register_graph(graph, Some(self.plugin.clone()))
    }
}

static_assertions::assert_impl_all!(Engine: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::scheduler::ManualFrameScheduler;
    use crate::types::BufferUsage;

    fn engine() -> (Engine, ManualFrameScheduler, Arc<DummyBackend>) {
        let backend = Arc::new(DummyBackend::new());
        let scheduler = ManualFrameScheduler::new();
        let engine = Engine::new(
            backend.clone(),
            Box::new(scheduler.clone()),
            EngineConfig::default().with_label("test"),
        );
        (engine, scheduler, backend)
    }

    #[test]
    fn test_state_machine() {
        let (mut engine, scheduler, _) = engine();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.pause().unwrap_err().is_validation());
        assert!(engine.resume().unwrap_err().is_validation());

        engine.start().unwrap();
        assert!(scheduler.pending().is_some());
        assert!(engine.start().unwrap_err().is_validation());
        assert!(engine.resume().unwrap_err().is_validation());

        engine.pause().unwrap();
        assert_eq!(engine.state(), EngineState::Paused);
        assert!(scheduler.pending().is_none());

        engine.resume().unwrap();
        assert!(scheduler.pending().is_some());

        engine.stop().unwrap();
        engine.stop().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(scheduler.pending().is_none());
    }

    #[test]
    fn test_frame_requests_next() {
        let (mut engine, scheduler, _) = engine();
        engine.start().unwrap();
        scheduler.take_pending().unwrap();
        let time = engine
            .frame(Duration::from_millis(100), |_, _| Ok(()))
            .unwrap()
            .unwrap();
        assert_eq!(time.frame_index, 0);
        assert!(scheduler.pending().is_some());

        engine.pause().unwrap();
        assert_eq!(engine.frame(Duration::from_millis(116), |_, _| Ok(())).unwrap(), None);
        assert!(scheduler.pending().is_none());
    }

    #[test]
    fn test_plugin_scope_requires_registration() {
        let (mut engine, _, _) = engine();
        let p = PluginId::new("p");
        assert!(engine.plugin(&p).unwrap_err().is_validation());
        engine.register_plugin(&p).unwrap();
        let buffer = engine
            .plugin(&p)
            .unwrap()
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::UNIFORM))
            .unwrap();
        assert_eq!(buffer.owner(), &p);
    }

    #[test]
    fn test_dispose_is_terminal() {
        let (mut engine, scheduler, backend) = engine();
        let p = PluginId::new("p");
        engine.register_plugin(&p).unwrap();
        engine
            .plugin(&p)
            .unwrap()
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::UNIFORM))
            .unwrap();
        engine.start().unwrap();

        engine.dispose();
        engine.dispose();
        assert_eq!(engine.state(), EngineState::Disposed);
        assert!(scheduler.pending().is_none());
        assert_eq!(backend.stats().buffers_destroyed, 1);
        assert!(matches!(engine.start(), Err(GraphicsError::AlreadyDisposed(_))));
        assert!(matches!(
            engine.register_plugin(&p),
            Err(GraphicsError::AlreadyDisposed(_))
        ));
        assert!(matches!(
            engine.frame(Duration::ZERO, |_, _| Ok(())),
            Err(GraphicsError::AlreadyDisposed(_))
        ));
    }

    #[test]
    fn test_device_loss_disposes() {
        let (mut engine, scheduler, backend) = engine();
        engine.start().unwrap();
        scheduler.take_pending();
        backend.simulate_device_loss("removed");
        let err = engine.frame(Duration::ZERO, |_, _| Ok(())).unwrap_err();
        assert_eq!(err, GraphicsError::DeviceLost("removed".into()));
        assert!(engine.is_disposed());
    }
}
