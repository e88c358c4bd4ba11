//! Reference-counted handles to manager-owned GPU objects.
//!
//! A [`Handle`] is a cheap, cloneable *view* of an object that a manager owns.
//! Cloning a handle does not change its reference count; the count moves only
//! through [`Handle::add_ref`] and [`Handle::release`] (or their holder-attributed
//! forms). When the count reaches zero the handle is marked disposed and the
//! owning manager's dispose hook runs exactly once, removing the entry from the
//! manager and releasing the native object.
//!
//! Every reference is attributed to a *holder* plugin. Plain `add_ref`/`release`
//! act on behalf of the creating plugin, so single-plugin code never has to
//! think about holders. [`HandleGuard`] is the RAII form: it takes a reference
//! when created and gives it back when dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::DrainPolicy;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::PluginId;

/// Kind of object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
    Pipeline,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Sampler => "sampler",
            Self::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a handle, unique per manager and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId {
    kind: ResourceKind,
    serial: u64,
}

impl HandleId {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.serial)
    }
}

/// Point-in-time description of a handle, used by snapshots and leak reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    pub id: HandleId,
    pub owner: PluginId,
    pub ref_count: u32,
    pub created_at: Instant,
    pub holders: Vec<(PluginId, u32)>,
}

/// Monotonic id source shared by one manager.
#[derive(Debug, Default)]
pub(crate) struct HandleIdAllocator {
    next: AtomicU64,
}

impl HandleIdAllocator {
    pub(crate) fn next(&self, kind: ResourceKind) -> HandleId {
        HandleId {
            kind,
            serial: self.next.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }
}

/// Called by a handle whose count reached zero.
///
/// Implemented by the managers; runs exactly once per handle and never while
/// the handle's own lock is held.
pub(crate) trait DisposeHook<T>: Send + Sync {
    fn on_dispose(&self, id: HandleId, object: &T);
}

struct RefState {
    holders: BTreeMap<PluginId, u32>,
    disposed: bool,
}

impl RefState {
    fn total(&self) -> u32 {
        self.holders.values().sum()
    }
}

struct HandleInner<T> {
    id: HandleId,
    owner: PluginId,
    created_at: Instant,
    state: Mutex<RefState>,
    object: T,
    hook: Weak<dyn DisposeHook<T>>,
}

/// Reference-counted view of a manager-owned object.
pub struct Handle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T: Send + Sync + 'static> Handle<T> {
    /// New handle with one reference held by `owner`.
    pub(crate) fn new(
        id: HandleId,
        owner: PluginId,
        object: T,
        hook: Weak<dyn DisposeHook<T>>,
    ) -> Self {
        let mut holders = BTreeMap::new();
        holders.insert(owner.clone(), 1);
        Self {
            inner: Arc::new(HandleInner {
                id,
                owner,
                created_at: Instant::now(),
                state: Mutex::new(RefState {
                    holders,
                    disposed: false,
                }),
                object,
                hook,
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    /// The plugin that created the object.
    pub fn owner(&self) -> &PluginId {
        &self.inner.owner
    }

    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Total references across all holders.
    pub fn ref_count(&self) -> u32 {
        self.inner.state.lock().total()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Per-holder reference counts, ordered by holder id.
    pub fn holders(&self) -> Vec<(PluginId, u32)> {
        self.inner
            .state
            .lock()
            .holders
            .iter()
            .map(|(holder, count)| (holder.clone(), *count))
            .collect()
    }

    /// References currently held by `holder`.
    pub fn held_by(&self, holder: &PluginId) -> u32 {
        self.inner
            .state
            .lock()
            .holders
            .get(holder)
            .copied()
            .unwrap_or(0)
    }

    /// True if any plugin other than the owner holds a reference.
    pub fn has_foreign_holders(&self) -> bool {
        self.inner
            .state
            .lock()
            .holders
            .keys()
            .any(|holder| holder != &self.inner.owner)
    }

    /// Take another reference on behalf of the owner.
    pub fn add_ref(&self) -> GraphicsResult<u32> {
        let owner = self.inner.owner.clone();
        self.add_ref_for(&owner)
    }

    /// Take another reference on behalf of `holder`.
    pub fn add_ref_for(&self, holder: &PluginId) -> GraphicsResult<u32> {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(GraphicsError::AlreadyDisposed(self.inner.id.to_string()));
        }
        *state.holders.entry(holder.clone()).or_insert(0) += 1;
        let total = state.total();
        log::trace!("{} add_ref by '{holder}' -> {total}", self.inner.id);
        Ok(total)
    }

    /// Drop one reference and return the remaining count.
    ///
    /// Releases an owner reference first, then any other holder's. A no-op on
    /// a disposed handle.
    pub fn release(&self) -> u32 {
        let state = self.inner.state.lock();
        if state.disposed {
            return 0;
        }
        let holder = if state.holders.contains_key(&self.inner.owner) {
            Some(self.inner.owner.clone())
        } else {
            state.holders.keys().next().cloned()
        };
        match holder {
            Some(holder) => self.release_locked(state, &holder),
            None => 0,
        }
    }

    /// Drop one reference held by `holder`.
    ///
    /// Releasing for a plugin that holds nothing is logged and ignored.
    pub fn release_for(&self, holder: &PluginId) -> u32 {
        let state = self.inner.state.lock();
        if state.disposed {
            return 0;
        }
        if !state.holders.contains_key(holder) {
            let total = state.total();
            drop(state);
            log::warn!(
                "{}: release by '{holder}' which holds no reference",
                self.inner.id
            );
            return total;
        }
        self.release_locked(state, holder)
    }

    /// Drop every reference held by `holder`; returns how many were dropped.
    pub fn drain_for(&self, holder: &PluginId) -> u32 {
        let mut released = 0;
        while !self.is_disposed() && self.held_by(holder) > 0 {
            self.release_for(holder);
            released += 1;
        }
        released
    }

    /// Release until the handle is disposed, ignoring who holds the
    /// references. Returns how many releases it took.
    pub fn force_drain(&self) -> u32 {
        let mut released = 0;
        while !self.is_disposed() && self.ref_count() > 0 {
            self.release();
            released += 1;
        }
        released
    }

    /// Take a reference for the owner that is given back on drop.
    pub fn guard(&self) -> GraphicsResult<HandleGuard<T>> {
        self.add_ref()?;
        Ok(HandleGuard {
            handle: self.clone(),
            holder: None,
        })
    }

    /// Take a reference for `holder` that is given back on drop.
    pub fn guard_for(&self, holder: &PluginId) -> GraphicsResult<HandleGuard<T>> {
        self.add_ref_for(holder)?;
        Ok(HandleGuard {
            handle: self.clone(),
            holder: Some(holder.clone()),
        })
    }

    /// Describe the handle's current state.
    pub fn info(&self) -> HandleInfo {
        let holders = self.holders();
        HandleInfo {
            id: self.inner.id,
            owner: self.inner.owner.clone(),
            ref_count: holders.iter().map(|(_, count)| count).sum(),
            created_at: self.inner.created_at,
            holders,
        }
    }

    /// Same underlying object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn release_locked(
        &self,
        mut state: parking_lot::MutexGuard<'_, RefState>,
        holder: &PluginId,
    ) -> u32 {
        if let Some(count) = state.holders.get_mut(holder) {
            *count -= 1;
            if *count == 0 {
                state.holders.remove(holder);
            }
        }
        let total = state.total();
        if total > 0 {
            log::trace!("{} release by '{holder}' -> {total}", self.inner.id);
            return total;
        }
        state.disposed = true;
        drop(state);

        log::trace!("{} disposed", self.inner.id);
        match self.inner.hook.upgrade() {
            Some(hook) => hook.on_dispose(self.inner.id, &self.inner.object),
            // The manager detached the native object when it was dropped.
            None => log::debug!("{} disposed after its manager was dropped", self.inner.id),
        }
        0
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.object
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("ref_count", &state.total())
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// A reference that is released when dropped.
pub struct HandleGuard<T: Send + Sync + 'static> {
    handle: Handle<T>,
    holder: Option<PluginId>,
}

impl<T: Send + Sync + 'static> HandleGuard<T> {
    pub fn handle(&self) -> &Handle<T> {
        &self.handle
    }
}

impl<T: Send + Sync + 'static> Deref for HandleGuard<T> {
    type Target = Handle<T>;

    fn deref(&self) -> &Handle<T> {
        &self.handle
    }
}

impl<T: Send + Sync + 'static> Drop for HandleGuard<T> {
    fn drop(&mut self) {
        match &self.holder {
            Some(holder) => {
                self.handle.release_for(holder);
            }
            None => {
                self.handle.release();
            }
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for HandleGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleGuard")
            .field("handle", &self.handle)
            .field("holder", &self.holder)
            .finish()
    }
}

/// Id-ordered table of live handles, as kept by the managers.
pub(crate) type HandleMap<T> = Mutex<BTreeMap<HandleId, Handle<T>>>;

pub(crate) fn snapshot<T>(map: &HandleMap<T>) -> Vec<Handle<T>> {
    map.lock().values().cloned().collect()
}

/// Drain every handle in `map` that `plugin` created or holds.
///
/// Handles are cloned out first so dispose hooks can lock the map.
pub(crate) fn drain_map<T: Send + Sync + 'static>(
    map: &HandleMap<T>,
    plugin: &PluginId,
    policy: DrainPolicy,
) -> usize {
    let mut disposed = 0;
    for handle in snapshot(map) {
        if handle.owner() == plugin {
            match policy {
                DrainPolicy::Force => {
                    handle.force_drain();
                }
                DrainPolicy::RespectForeignReferences => {
                    handle.drain_for(plugin);
                    if !handle.is_disposed() {
                        log::debug!(
                            "{} kept alive by {:?} after '{plugin}' released it",
                            handle.id(),
                            handle.holders()
                        );
                    }
                }
            }
            if handle.is_disposed() {
                disposed += 1;
            }
        } else if handle.held_by(plugin) > 0 {
            handle.drain_for(plugin);
            if handle.is_disposed() {
                disposed += 1;
            }
        }
    }
    disposed
}

pub(crate) fn force_drain_all<T: Send + Sync + 'static>(map: &HandleMap<T>) {
    for handle in snapshot(map) {
        handle.force_drain();
    }
}

static_assertions::assert_impl_all!(Handle<u32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(HandleGuard<u32>: Send, Sync);
