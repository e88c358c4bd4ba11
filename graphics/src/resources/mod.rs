//! GPU resources and their manager.
//!
//! The [`ResourceManager`] owns every buffer, texture and sampler created
//! through it:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] - GPU texture/image
//! - [`Sampler`] - Texture sampler
//!
//! Callers receive [`Handle`]s tagged with the creating plugin. When a handle's
//! count reaches zero its entry is removed from the manager and the native
//! object is destroyed. [`ResourceManager::release_plugin_resources`] drains
//! everything a plugin created in one call, for plugin teardown.

mod buffer;
mod sampler;
mod texture;

pub use buffer::{Buffer, BufferHandle};
pub use sampler::{Sampler, SamplerHandle};
pub use texture::{ESTIMATED_BYTES_PER_PIXEL, Texture, TextureHandle};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::GpuBackend;
use crate::config::DrainPolicy;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{
    DisposeHook, Handle, HandleId, HandleIdAllocator, HandleInfo, HandleMap, ResourceKind, drain_map,
    force_drain_all, snapshot,
};
use crate::types::{
    BufferDescriptor, PluginId, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};

/// Ids of the live resources created by one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginResources {
    pub buffers: Vec<HandleId>,
    pub textures: Vec<HandleId>,
    pub samplers: Vec<HandleId>,
}

impl PluginResources {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty() && self.samplers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len() + self.samplers.len()
    }
}

/// A live resource as seen by leak detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub kind: ResourceKind,
    pub info: HandleInfo,
}

struct ResourceShared {
    backend: Arc<dyn GpuBackend>,
    ids: HandleIdAllocator,
    buffers: HandleMap<Buffer>,
    textures: HandleMap<Texture>,
    samplers: HandleMap<Sampler>,
    drain_policy: DrainPolicy,
    disposed: AtomicBool,
}

impl DisposeHook<Buffer> for ResourceShared {
    fn on_dispose(&self, id: HandleId, buffer: &Buffer) {
        self.buffers.lock().remove(&id);
        if let Some(native) = buffer.take_native() {
            self.backend.destroy_buffer(native);
        }
        log::trace!("ResourceManager: destroyed {id}");
    }
}

impl DisposeHook<Texture> for ResourceShared {
    fn on_dispose(&self, id: HandleId, texture: &Texture) {
        self.textures.lock().remove(&id);
        if let Some(native) = texture.take_native() {
            self.backend.destroy_texture(native);
        }
        log::trace!("ResourceManager: destroyed {id}");
    }
}

impl DisposeHook<Sampler> for ResourceShared {
    fn on_dispose(&self, id: HandleId, _sampler: &Sampler) {
        self.samplers.lock().remove(&id);
        log::trace!("ResourceManager: dropped {id}");
    }
}

impl Drop for ResourceShared {
    fn drop(&mut self) {
        // Handles still held by plugins outlive the manager; detach their
        // native objects so later access reports them disposed.
        let mut destroyed = 0;
        for buffer in self.buffers.get_mut().values() {
            if let Some(native) = buffer.take_native() {
                self.backend.destroy_buffer(native);
                destroyed += 1;
            }
        }
        for texture in self.textures.get_mut().values() {
            if let Some(native) = texture.take_native() {
                self.backend.destroy_texture(native);
                destroyed += 1;
            }
        }
        self.buffers.get_mut().clear();
        self.textures.get_mut().clear();
        self.samplers.get_mut().clear();
        if destroyed > 0 {
            log::debug!("ResourceManager: dropped with {destroyed} live resource(s)");
        }
    }
}

/// Owner of all buffer, texture and sampler objects.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ResourceManager {
    shared: Arc<ResourceShared>,
}

static_assertions::assert_impl_all!(ResourceManager: Send, Sync);

impl ResourceManager {
    pub fn new(backend: Arc<dyn GpuBackend>, drain_policy: DrainPolicy) -> Self {
        Self {
            shared: Arc::new(ResourceShared {
                backend,
                ids: HandleIdAllocator::default(),
                buffers: Mutex::new(BTreeMap::new()),
                textures: Mutex::new(BTreeMap::new()),
                samplers: Mutex::new(BTreeMap::new()),
                drain_policy,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        self.shared.drain_policy
    }

    /// Create a buffer owned by `owner`.
    pub fn create_buffer(
        &self,
        owner: &PluginId,
        descriptor: &BufferDescriptor,
    ) -> GraphicsResult<BufferHandle> {
        self.check_alive()?;
        if descriptor.size == 0 {
            return Err(GraphicsError::validation(format!(
                "buffer {:?} has zero size",
                descriptor.label
            )));
        }

        let native = self.shared.backend.create_buffer(descriptor)?;
        let id = self.shared.ids.next(ResourceKind::Buffer);
        let buffer = Buffer::new(
            id,
            Arc::clone(&self.shared.backend),
            descriptor.clone(),
            native,
        );
        let hook: Weak<dyn DisposeHook<Buffer>> = Arc::downgrade(&self.shared) as _;
        let handle = Handle::new(id, owner.clone(), buffer, hook);
        self.shared.buffers.lock().insert(id, handle.clone());

        log::trace!(
            "ResourceManager: created {id} {:?} ({} bytes) for '{owner}'",
            descriptor.label,
            descriptor.size
        );
        Ok(handle)
    }

    /// Create a buffer and upload `data` into it.
    pub fn create_buffer_with_data(
        &self,
        owner: &PluginId,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> GraphicsResult<BufferHandle> {
        let handle = self.create_buffer(owner, descriptor)?;
        if let Err(err) = handle.write(0, data) {
            handle.force_drain();
            return Err(err);
        }
        Ok(handle)
    }

    /// Create a texture owned by `owner`.
    pub fn create_texture(
        &self,
        owner: &PluginId,
        descriptor: &TextureDescriptor,
    ) -> GraphicsResult<TextureHandle> {
        self.check_alive()?;
        if descriptor.size.is_empty() {
            return Err(GraphicsError::validation(format!(
                "texture {:?} has an empty extent {:?}",
                descriptor.label, descriptor.size
            )));
        }
        if descriptor.mip_level_count == 0 || descriptor.sample_count == 0 {
            return Err(GraphicsError::validation(format!(
                "texture {:?} needs at least one mip level and one sample",
                descriptor.label
            )));
        }
        if descriptor.base_level_size().is_none() {
            return Err(GraphicsError::validation(format!(
                "texture {:?} of {:?} {:?} is too large",
                descriptor.label, descriptor.size, descriptor.format
            )));
        }

        let native = self.shared.backend.create_texture(descriptor)?;
        let id = self.shared.ids.next(ResourceKind::Texture);
        let texture = Texture::new(
            id,
            Arc::clone(&self.shared.backend),
            descriptor.clone(),
            native,
        );
        let hook: Weak<dyn DisposeHook<Texture>> = Arc::downgrade(&self.shared) as _;
        let handle = Handle::new(id, owner.clone(), texture, hook);
        self.shared.textures.lock().insert(id, handle.clone());

        log::trace!(
            "ResourceManager: created {id} {:?} ({}x{}) for '{owner}'",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );
        Ok(handle)
    }

    /// Create an RGBA8 texture from a decoded image and upload its pixels.
    pub fn create_texture_from_image(
        &self,
        owner: &PluginId,
        image: &image::DynamicImage,
        label: Option<&str>,
    ) -> GraphicsResult<TextureHandle> {
        let rgba = image.to_rgba8();
        let mut descriptor = TextureDescriptor::new_2d(
            rgba.width(),
            rgba.height(),
            TextureFormat::Rgba8UnormSrgb,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::RENDER_ATTACHMENT,
        );
        descriptor.label = label.map(str::to_owned);

        let handle = self.create_texture(owner, &descriptor)?;
        if let Err(err) = handle.write(rgba.as_raw()) {
            handle.force_drain();
            return Err(err);
        }
        Ok(handle)
    }

    /// Decode an encoded image (PNG) and create a texture from it.
    pub fn create_texture_from_encoded(
        &self,
        owner: &PluginId,
        bytes: &[u8],
        label: Option<&str>,
    ) -> GraphicsResult<TextureHandle> {
        let image = image::load_from_memory(bytes).map_err(|err| {
            GraphicsError::ResourceCreationFailed(format!("failed to decode image {label:?}: {err}"))
        })?;
        self.create_texture_from_image(owner, &image, label)
    }

    /// Create a sampler owned by `owner`.
    pub fn create_sampler(
        &self,
        owner: &PluginId,
        descriptor: &SamplerDescriptor,
    ) -> GraphicsResult<SamplerHandle> {
        self.check_alive()?;
        if descriptor.lod_min_clamp > descriptor.lod_max_clamp {
            return Err(GraphicsError::validation(format!(
                "sampler {:?} has lod_min_clamp above lod_max_clamp",
                descriptor.label
            )));
        }

        let native = self.shared.backend.create_sampler(descriptor)?;
        let id = self.shared.ids.next(ResourceKind::Sampler);
        let hook: Weak<dyn DisposeHook<Sampler>> = Arc::downgrade(&self.shared) as _;
        let handle = Handle::new(
            id,
            owner.clone(),
            Sampler::new(descriptor.clone(), native),
            hook,
        );
        self.shared.samplers.lock().insert(id, handle.clone());

        log::trace!("ResourceManager: created {id} for '{owner}'");
        Ok(handle)
    }

    pub fn buffer(&self, id: HandleId) -> Option<BufferHandle> {
        self.shared.buffers.lock().get(&id).cloned()
    }

    pub fn texture(&self, id: HandleId) -> Option<TextureHandle> {
        self.shared.textures.lock().get(&id).cloned()
    }

    pub fn sampler(&self, id: HandleId) -> Option<SamplerHandle> {
        self.shared.samplers.lock().get(&id).cloned()
    }

    /// Live resources created by `plugin`, in creation order.
    pub fn plugin_resources(&self, plugin: &PluginId) -> PluginResources {
        PluginResources {
            buffers: owned_ids(&self.shared.buffers, plugin),
            textures: owned_ids(&self.shared.textures, plugin),
            samplers: owned_ids(&self.shared.samplers, plugin),
        }
    }

    /// Live, undisposed resources created by `plugin`, with their state.
    pub fn plugin_resource_entries(&self, plugin: &PluginId) -> Vec<ResourceEntry> {
        let mut entries = owned_entries(&self.shared.buffers, plugin, ResourceKind::Buffer);
        entries.extend(owned_entries(
            &self.shared.textures,
            plugin,
            ResourceKind::Texture,
        ));
        entries.extend(owned_entries(
            &self.shared.samplers,
            plugin,
            ResourceKind::Sampler,
        ));
        entries
    }

    /// Drain every resource created by `plugin`.
    ///
    /// Under [`DrainPolicy::Force`] each handle is released until disposed,
    /// whoever holds the references. Under
    /// [`DrainPolicy::RespectForeignReferences`] only the plugin's own
    /// references are dropped. In both cases references `plugin` holds on
    /// other plugins' resources are dropped too. Returns the number of
    /// handles disposed.
    pub fn release_plugin_resources(&self, plugin: &PluginId) -> usize {
        let policy = self.shared.drain_policy;
        let disposed = drain_map(&self.shared.buffers, plugin, policy)
            + drain_map(&self.shared.textures, plugin, policy)
            + drain_map(&self.shared.samplers, plugin, policy);
        log::debug!("ResourceManager: drained {disposed} resource(s) of '{plugin}'");
        disposed
    }

    /// Sum of buffer sizes plus `width * height * 4` per texture, saturating
    /// at `u64::MAX`.
    pub fn estimated_memory_usage(&self) -> u64 {
        let buffers = self
            .shared
            .buffers
            .lock()
            .values()
            .fold(0u64, |total, buffer| total.saturating_add(buffer.size()));
        let textures = self
            .shared
            .textures
            .lock()
            .values()
            .fold(0u64, |total, texture| {
                total.saturating_add(texture.estimated_size())
            });
        buffers.saturating_add(textures)
    }

    pub fn buffer_count(&self) -> usize {
        self.shared.buffers.lock().len()
    }

    pub fn texture_count(&self) -> usize {
        self.shared.textures.lock().len()
    }

    pub fn sampler_count(&self) -> usize {
        self.shared.samplers.lock().len()
    }

    /// Total live handles of all kinds.
    pub fn live_count(&self) -> usize {
        self.buffer_count() + self.texture_count() + self.sampler_count()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Destroy every remaining resource. Idempotent; later creation calls fail
    /// with [`GraphicsError::AlreadyDisposed`].
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let remaining = self.live_count();
        force_drain_all(&self.shared.buffers);
        force_drain_all(&self.shared.textures);
        force_drain_all(&self.shared.samplers);
        log::info!("ResourceManager: disposed ({remaining} resource(s) released)");
    }

    fn check_alive(&self) -> GraphicsResult<()> {
        if self.is_disposed() {
            return Err(GraphicsError::AlreadyDisposed("resource manager".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("backend", &self.shared.backend.name())
            .field("buffers", &self.buffer_count())
            .field("textures", &self.texture_count())
            .field("samplers", &self.sampler_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn owned_ids<T: Send + Sync + 'static>(map: &HandleMap<T>, plugin: &PluginId) -> Vec<HandleId> {
    map.lock()
        .values()
        .filter(|handle| handle.owner() == plugin)
        .map(Handle::id)
        .collect()
}

fn owned_entries<T: Send + Sync + 'static>(
    map: &HandleMap<T>,
    plugin: &PluginId,
    kind: ResourceKind,
) -> Vec<ResourceEntry> {
    snapshot(map)
        .into_iter()
        .filter(|handle| handle.owner() == plugin && !handle.is_disposed())
        .map(|handle| ResourceEntry {
            kind,
            info: handle.info(),
        })
        .collect()
}
