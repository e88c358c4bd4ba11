//! Engine configuration.

use std::time::Duration;

/// How plugin teardown treats references held by *other* plugins on the
/// plugin's own objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrainPolicy {
    /// Release every reference regardless of holder; the object is always
    /// destroyed with its creator.
    #[default]
    Force,
    /// Release only the tearing-down plugin's own references. Objects still
    /// held by other plugins stay alive and are reported as leaks.
    RespectForeignReferences,
}

/// Configuration for [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Name used in log output.
    pub label: String,
    /// Upper bound on bind groups tried when a pipeline infers its layouts.
    pub max_inferred_bind_groups: u32,
    /// Teardown behaviour for shared objects.
    pub drain_policy: DrainPolicy,
    /// Frame deltas above this are clamped (stalls, debugger breaks).
    pub max_frame_delta: Duration,
    /// Frame deltas below this are raised to it.
    pub min_frame_delta: Duration,
    /// Flush pending command buffers at the end of every frame.
    pub auto_submit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: "engine".into(),
            max_inferred_bind_groups: 4,
            drain_policy: DrainPolicy::Force,
            max_frame_delta: Duration::from_millis(250),
            min_frame_delta: Duration::ZERO,
            auto_submit: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_max_inferred_bind_groups(mut self, max: u32) -> Self {
        self.max_inferred_bind_groups = max;
        self
    }

    pub fn with_drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.drain_policy = policy;
        self
    }

    /// Set the frame delta clamp range.
    pub fn with_frame_delta_clamp(mut self, min: Duration, max: Duration) -> Self {
        debug_assert!(min <= max);
        self.min_frame_delta = min;
        self.max_frame_delta = max;
        self
    }

    pub fn with_auto_submit(mut self, auto_submit: bool) -> Self {
        self.auto_submit = auto_submit;
        self
    }
}
