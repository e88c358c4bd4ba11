//! Frame timing and the host frame-scheduling boundary.
//!
//! The engine never drives its own loop. It asks a [`FrameScheduler`] for the
//! next frame, and the host calls [`Engine::frame`](crate::Engine::frame) with
//! a timestamp when that request fires. [`FrameClock`] turns those timestamps
//! into clamped deltas.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`FrameScheduler`] | Host primitive that fires frame callbacks |
//! | [`ManualFrameScheduler`] | Scheduler driven by hand, for tests and tools |
//! | [`FrameClock`] | Timestamp to [`FrameTime`] conversion |

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Token for one outstanding frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

impl FrameRequest {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// The host's per-frame callback primitive.
pub trait FrameScheduler: Send {
    /// Ask for one frame callback.
    fn request_frame(&mut self) -> FrameRequest;

    /// Withdraw a request that has not fired yet.
    fn cancel_frame(&mut self, request: FrameRequest);
}

#[derive(Debug, Default)]
struct ManualState {
    next: u64,
    pending: Option<FrameRequest>,
    requested: u64,
    cancelled: u64,
}

/// A scheduler whose requests fire only when the host takes them.
///
/// Clones share state, so a host can keep one clone while the engine owns
/// another.
///
/// ```ignore
/// let scheduler = ManualFrameScheduler::new();
/// let mut engine = Engine::new(backend, Box::new(scheduler.clone()), config)?;
/// engine.start()?;
/// while scheduler.take_pending().is_some() {
///     engine.frame(now(), |_| Ok(()))?;
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualFrameScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request waiting to fire, if any.
    pub fn pending(&self) -> Option<FrameRequest> {
        self.state.lock().pending
    }

    /// Fire the pending request.
    pub fn take_pending(&self) -> Option<FrameRequest> {
        self.state.lock().pending.take()
    }

    pub fn requested_count(&self) -> u64 {
        self.state.lock().requested
    }

    pub fn cancelled_count(&self) -> u64 {
        self.state.lock().cancelled
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        let mut state = self.state.lock();
        state.next += 1;
        state.requested += 1;
        let request = FrameRequest(state.next);
        if let Some(previous) = state.pending.replace(request) {
            log::trace!("ManualFrameScheduler: request {} superseded", previous.0);
        }
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        let mut state = self.state.lock();
        if state.pending == Some(request) {
            state.pending = None;
            state.cancelled += 1;
        }
    }
}

/// Timing of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTime {
    /// Clamped time since the previous frame.
    pub delta: Duration,
    /// Sum of clamped deltas since the clock started.
    pub elapsed: Duration,
    /// Monotonic frame counter, starting at 0.
    pub frame_index: u64,
}

impl FrameTime {
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// Produces [`FrameTime`] values from host timestamps.
///
/// Deltas are clamped so a stall or a debugger break does not produce one
/// giant step. The first tick after [`reset`](Self::reset) has a zero delta
/// before clamping.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Duration>,
    elapsed: Duration,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::ZERO, Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: None,
            elapsed: Duration::ZERO,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Forget the previous timestamp, e.g. after a pause.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Advance to `timestamp`.
    pub fn tick(&mut self, timestamp: Duration) -> FrameTime {
        let raw = match self.last {
            Some(last) => timestamp.saturating_sub(last),
            None => Duration::ZERO,
        };
        let delta = raw.clamp(self.dt_min, self.dt_max);
        self.last = Some(timestamp);
        self.elapsed += delta;

        let time = FrameTime {
            delta,
            elapsed: self.elapsed,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }

    /// Frames ticked so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
