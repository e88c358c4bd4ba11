//! Plugin lifecycle and leak detection.
//!
//! [`HotReloadManager`] tracks which plugins are loaded and tears them down
//! through the resource manager and pipeline registry. Every teardown follows
//! the same three steps:
//!
//! 1. snapshot the ids of everything the plugin owns,
//! 2. drain the plugin's objects in both managers,
//! 3. look for objects the plugin still owns and record them as leaks.
//!
//! Leaks are reported, never returned as errors; teardown always completes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{HandleId, ResourceKind};
use crate::pipeline::PipelineRegistry;
use crate::resources::ResourceManager;
use crate::types::PluginId;

/// Ids a plugin owned right before teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginSnapshot {
    pub buffer_ids: Vec<HandleId>,
    pub texture_ids: Vec<HandleId>,
    pub sampler_ids: Vec<HandleId>,
    pub pipeline_ids: Vec<HandleId>,
}

impl PluginSnapshot {
    pub fn len(&self) -> usize {
        self.buffer_ids.len() + self.texture_ids.len() + self.sampler_ids.len() + self.pipeline_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An object that outlived its owner's teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakEntry {
    pub resource_kind: ResourceKind,
    pub resource_id: HandleId,
    pub ref_count: u32,
    pub plugin_id: PluginId,
    pub created_at: Instant,
    /// Who still holds references.
    pub holders: Vec<(PluginId, u32)>,
}

impl fmt::Display for LeakEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} owned by '{}' with {} reference(s), age {:?}",
            self.resource_id,
            self.plugin_id,
            self.ref_count,
            self.created_at.elapsed()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeakReport {
    /// `None` for a report aggregated over every plugin.
    pub plugin_id: Option<PluginId>,
    pub leaks: Vec<LeakEntry>,
    pub total_leak_count: usize,
    pub has_leaks: bool,
}

impl LeakReport {
    fn new(plugin_id: Option<PluginId>, leaks: Vec<LeakEntry>) -> Self {
        Self {
            plugin_id,
            total_leak_count: leaks.len(),
            has_leaks: !leaks.is_empty(),
            leaks,
        }
    }
}

#[derive(Debug, Default)]
struct HotReloadState {
    plugins: Vec<PluginId>,
    reports: BTreeMap<PluginId, LeakReport>,
    snapshots: BTreeMap<PluginId, PluginSnapshot>,
    disposed: bool,
}

/// Per-plugin lifecycle coordinator.
pub struct HotReloadManager {
    resources: ResourceManager,
    pipelines: PipelineRegistry,
    state: Mutex<HotReloadState>,
}

impl HotReloadManager {
    pub fn new(resources: ResourceManager, pipelines: PipelineRegistry) -> Self {
        Self {
            resources,
            pipelines,
            state: Mutex::new(HotReloadState::default()),
        }
    }

    /// Start tracking `plugin`. Registering twice is a no-op.
    ///
    /// The host's own id ([`PluginId::HOST`]) cannot be registered.
    pub fn register_plugin(&self, plugin: &PluginId) -> GraphicsResult<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(GraphicsError::AlreadyDisposed("hot reload manager".into()));
        }
        if plugin.as_str() == PluginId::HOST {
            return Err(GraphicsError::validation(format!(
                "plugin id '{plugin}' is reserved for the host"
            )));
        }
        if state.plugins.contains(plugin) {
            log::warn!("HotReloadManager: plugin '{plugin}' is already registered");
            return Ok(());
        }
        state.plugins.push(plugin.clone());
        log::info!("HotReloadManager: registered plugin '{plugin}'");
        Ok(())
    }

    /// Release everything `plugin` owns but keep it registered, as before a
    /// reload of its code.
    pub fn invalidate_plugin(&self, plugin: &PluginId) -> GraphicsResult<LeakReport> {
        self.require_registered(plugin)?;
        let report = self.teardown(plugin);
        log::info!("HotReloadManager: invalidated plugin '{plugin}'");
        Ok(report)
    }

    /// Release everything `plugin` owns and stop tracking it.
    pub fn unregister_plugin(&self, plugin: &PluginId) -> GraphicsResult<LeakReport> {
        self.require_registered(plugin)?;
        let report = self.teardown(plugin);
        self.state.lock().plugins.retain(|p| p != plugin);
        log::info!("HotReloadManager: unregistered plugin '{plugin}'");
        Ok(report)
    }

    /// Ids of the live objects `plugin` owns.
    pub fn snapshot(&self, plugin: &PluginId) -> PluginSnapshot {
        let resources = self.resources.plugin_resources(plugin);
        PluginSnapshot {
            buffer_ids: resources.buffers,
            texture_ids: resources.textures,
            sampler_ids: resources.samplers,
            pipeline_ids: self.pipelines.plugin_pipelines(plugin),
        }
    }

    /// The snapshot taken at `plugin`'s last teardown.
    pub fn last_snapshot(&self, plugin: &PluginId) -> Option<PluginSnapshot> {
        self.state.lock().snapshots.get(plugin).cloned()
    }

    /// The retained report of one plugin, or all retained reports merged.
    pub fn leak_report(&self, plugin: Option<&PluginId>) -> LeakReport {
        let state = self.state.lock();
        match plugin {
            Some(plugin) => state
                .reports
                .get(plugin)
                .cloned()
                .unwrap_or_else(|| LeakReport::new(Some(plugin.clone()), Vec::new())),
            None => {
                let leaks = state
                    .reports
                    .values()
                    .flat_map(|report| report.leaks.iter().cloned())
                    .collect();
                LeakReport::new(None, leaks)
            }
        }
    }

    /// Forget retained reports for one plugin, or for all.
    pub fn clear_leak_reports(&self, plugin: Option<&PluginId>) {
        let mut state = self.state.lock();
        match plugin {
            Some(plugin) => {
                state.reports.remove(plugin);
            }
            None => state.reports.clear(),
        }
    }

    pub fn is_registered(&self, plugin: &PluginId) -> bool {
        self.state.lock().plugins.contains(plugin)
    }

    /// Registered plugins in registration order.
    pub fn registered_plugins(&self) -> Vec<PluginId> {
        self.state.lock().plugins.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Unregister every plugin. Idempotent.
    pub fn dispose(&self) {
        let plugins = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.plugins)
        };
        for plugin in &plugins {
            self.teardown(plugin);
        }
        log::info!(
            "HotReloadManager: disposed, {} plugin(s) force-unregistered",
            plugins.len()
        );
    }

    fn require_registered(&self, plugin: &PluginId) -> GraphicsResult<()> {
        let state = self.state.lock();
        if state.disposed {
            return Err(GraphicsError::AlreadyDisposed("hot reload manager".into()));
        }
        if !state.plugins.contains(plugin) {
            return Err(GraphicsError::validation(format!(
                "plugin '{plugin}' is not registered"
            )));
        }
        Ok(())
    }

    fn teardown(&self, plugin: &PluginId) -> LeakReport {
        let snapshot = self.snapshot(plugin);

        let resources = self.resources.release_plugin_resources(plugin);
        let pipelines = self.pipelines.release_plugin_pipelines(plugin);
        log::debug!(
            "HotReloadManager: '{plugin}' owned {} object(s), {resources} resource(s) and {pipelines} pipeline(s) disposed",
            snapshot.len()
        );

        let mut leaks: Vec<LeakEntry> = self
            .resources
            .plugin_resource_entries(plugin)
            .into_iter()
            .map(|entry| leak_entry(entry.kind, entry.info))
            .collect();
        leaks.extend(
            self.pipelines
                .plugin_pipeline_entries(plugin)
                .into_iter()
                .map(|info| leak_entry(ResourceKind::Pipeline, info)),
        );
        for leak in &leaks {
            log::warn!("HotReloadManager: leak: {leak}");
        }

        let report = LeakReport::new(Some(plugin.clone()), leaks);
        let mut state = self.state.lock();
        state.snapshots.insert(plugin.clone(), snapshot);
        state.reports.insert(plugin.clone(), report.clone());
        report
    }
}

fn leak_entry(kind: ResourceKind, info: crate::handle::HandleInfo) -> LeakEntry {
    LeakEntry {
        resource_kind: kind,
        resource_id: info.id,
        ref_count: info.ref_count,
        plugin_id: info.owner,
        created_at: info.created_at,
        holders: info.holders,
    }
}

impl fmt::Debug for HotReloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HotReloadManager")
            .field("plugins", &state.plugins)
            .field("reports", &state.reports.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

static_assertions::assert_impl_all!(HotReloadManager: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::DrainPolicy;
    use crate::types::{
        BufferDescriptor, BufferUsage, RenderPipelineDescriptor, ShaderStageDescriptor,
        TextureDescriptor, TextureFormat, TextureUsage,
    };

    const SHADER: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(f32(idx), 0.0, 0.0, 1.0);
}
"#;

    fn manager(policy: DrainPolicy) -> (HotReloadManager, Arc<DummyBackend>) {
        let backend = Arc::new(DummyBackend::new());
        let resources = ResourceManager::new(backend.clone(), policy);
        let pipelines = PipelineRegistry::new(backend.clone(), 4, policy);
        (HotReloadManager::new(resources, pipelines), backend)
    }

    fn texture(manager: &HotReloadManager, plugin: &PluginId) -> crate::resources::TextureHandle {
        manager
            .resources
            .create_texture(
                plugin,
                &TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::TEXTURE_BINDING),
            )
            .unwrap()
    }

    #[test]
    fn test_invalidate_clean_plugin() {
        let (manager, backend) = manager(DrainPolicy::Force);
        let p1 = PluginId::new("p1");
        manager.register_plugin(&p1).unwrap();
        manager
            .resources
            .create_buffer(&p1, &BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        manager
            .pipelines
            .create_pipeline(&p1, &RenderPipelineDescriptor::new(ShaderStageDescriptor::new(SHADER, "vs_main")))
            .unwrap();

        let report = manager.invalidate_plugin(&p1).unwrap();
        assert!(!report.has_leaks);
        assert_eq!(report.total_leak_count, 0);
        assert!(manager.is_registered(&p1));
        assert_eq!(backend.stats().buffers_destroyed, 1);

        let snapshot = manager.last_snapshot(&p1).unwrap();
        assert_eq!(snapshot.buffer_ids.len(), 1);
        assert_eq!(snapshot.pipeline_ids.len(), 1);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_unregister_drains_own_references() {
        let (manager, _backend) = manager(DrainPolicy::Force);
        let p2 = PluginId::new("p2");
        manager.register_plugin(&p2).unwrap();
        let tex = texture(&manager, &p2);
        tex.add_ref().unwrap();
        assert_eq!(tex.ref_count(), 2);

        let report = manager.unregister_plugin(&p2).unwrap();
        assert_eq!(report.total_leak_count, 0);
        assert!(tex.is_disposed());
        assert!(!manager.is_registered(&p2));
    }

    #[test]
    fn test_foreign_reference_reported_as_leak() {
        let (manager, _backend) = manager(DrainPolicy::RespectForeignReferences);
        let owner = PluginId::new("owner");
        let other = PluginId::new("other");
        manager.register_plugin(&owner).unwrap();
        let tex = texture(&manager, &owner);
        tex.add_ref_for(&other).unwrap();

        let report = manager.unregister_plugin(&owner).unwrap();
        assert!(report.has_leaks);
        let leak = &report.leaks[0];
        assert_eq!(leak.resource_kind, ResourceKind::Texture);
        assert_eq!(leak.resource_id, tex.id());
        assert_eq!(leak.ref_count, 1);
        assert_eq!(leak.holders, vec![(other.clone(), 1)]);

        tex.release_for(&other);
        assert!(tex.is_disposed());
    }

    #[test]
    fn test_aggregate_and_clear_reports() {
        let (manager, _backend) = manager(DrainPolicy::RespectForeignReferences);
        let a = PluginId::new("a");
        let b = PluginId::new("b");
        let host = PluginId::host();
        for plugin in [&a, &b] {
            manager.register_plugin(plugin).unwrap();
            texture(&manager, plugin).add_ref_for(&host).unwrap();
            manager.invalidate_plugin(plugin).unwrap();
        }

        let all = manager.leak_report(None);
        assert_eq!(all.plugin_id, None);
        assert_eq!(all.total_leak_count, 2);
        assert_eq!(manager.leak_report(Some(&a)).total_leak_count, 1);

        manager.clear_leak_reports(Some(&a));
        assert_eq!(manager.leak_report(None).total_leak_count, 1);
        manager.clear_leak_reports(None);
        assert!(!manager.leak_report(None).has_leaks);
    }

    #[test]
    fn test_unknown_plugin_and_double_register() {
        let (manager, _backend) = manager(DrainPolicy::Force);
        let p = PluginId::new("p");
        assert!(manager.invalidate_plugin(&p).unwrap_err().is_validation());
        assert!(manager.unregister_plugin(&p).unwrap_err().is_validation());

        manager.register_plugin(&p).unwrap();
        manager.register_plugin(&p).unwrap();
        assert_eq!(manager.registered_plugins(), vec![p]);
    }

    #[test]
    fn test_host_id_cannot_be_registered() {
        let (manager, _backend) = manager(DrainPolicy::Force);
        let err = manager.register_plugin(&PluginId::host()).unwrap_err();
        assert!(err.is_validation());
        assert!(manager.registered_plugins().is_empty());
        assert!(
            manager
                .invalidate_plugin(&PluginId::host())
                .unwrap_err()
                .is_validation()
        );
    }

    #[test]
    fn test_dispose_unregisters_everything() {
        let (manager, backend) = manager(DrainPolicy::Force);
        let p = PluginId::new("p");
        manager.register_plugin(&p).unwrap();
        let tex = texture(&manager, &p);

        manager.dispose();
        manager.dispose();
        assert!(tex.is_disposed());
        assert!(manager.registered_plugins().is_empty());
        assert_eq!(backend.stats().textures_destroyed, 1);
        assert!(matches!(
            manager.register_plugin(&p),
            Err(GraphicsError::AlreadyDisposed(_))
        ));
    }
}
