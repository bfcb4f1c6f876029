//! # Middleware configuration.
//!
//! Provides [`Config`], the scheduling and event settings of one
//! [`ListenerMiddleware`](crate::ListenerMiddleware) instance.
//!
//! ## Start policies
//! ```text
//! StartPolicy::Immediate   dispatch() ──► poll task once inline ──► pending? ──► runtime.spawn(rest)
//! StartPolicy::Deferred    dispatch() ──► runtime.spawn(task)  (first poll happens later)
//! ```
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1

/// When a newly created task gets its first poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartPolicy {
    /// Poll the task inline at the point it is created; hand it to the runtime only if it
    /// is still pending.
    #[default]
    Immediate,
    /// Spawn the task on the runtime; it never runs re-entrantly with its creator.
    Deferred,
}

/// Configuration for one middleware instance.
///
/// ## Field semantics
/// - `effect_start`: how listener effects start relative to the dispatch that matched them
/// - `fork_start`: how forked executors start relative to the `fork` call
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct Config {
    /// Start policy for listener effects.
    ///
    /// With [`StartPolicy::Immediate`] (the default) every matched effect runs up to its
    /// first suspension point before `dispatch` returns, in registration order.
    pub effect_start: StartPolicy,

    /// Start policy for forked executors.
    ///
    /// Defaults to [`StartPolicy::Deferred`]: the executor is never polled inside `fork`.
    pub fork_start: StartPolicy,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers that lag behind more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `effect_start = Immediate`
    /// - `fork_start = Deferred`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            effect_start: StartPolicy::Immediate,
            fork_start: StartPolicy::Deferred,
            bus_capacity: 1024,
        }
    }
}
