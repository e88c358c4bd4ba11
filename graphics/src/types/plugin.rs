//! Plugin identity.

use std::fmt;
use std::sync::Arc;

/// Identifier of a plugin that owns or holds GPU objects.
///
/// Cheap to clone. Ordering is lexical so per-plugin maps iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(Arc<str>);

impl PluginId {
    /// Reserved id used for objects created by the host itself.
    pub const HOST: &'static str = "host";

    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The host's own id.
    pub fn host() -> Self {
        Self::new(Self::HOST)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}
