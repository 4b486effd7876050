//! Replacement policies deciding how long to wait before retrying a failed
//! proxy construction.

use crate::backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
};
use std::sync::Arc;
use std::time::Duration;

/// How to space out replacement attempts after the factory fails.
///
/// The policy only applies to retries after a construction failure. A
/// replacement requested because a live proxy failed always starts right away.
#[derive(Clone, Default)]
pub enum ReconnectPolicy {
    /// Retry as soon as the worker gets to it, with no timer in between.
    #[default]
    Immediate,

    /// Fixed delay between attempts.
    Fixed(FixedInterval),

    /// Exponential backoff between attempts.
    Exponential(ExponentialBackoff),

    /// Exponential backoff with randomization to prevent thundering herd.
    ExponentialRandom(ExponentialRandomBackoff),

    /// Custom backoff function.
    Custom(Arc<dyn IntervalFunction>),
}

impl ReconnectPolicy {
    /// Retry immediately.
    pub fn immediate() -> Self {
        ReconnectPolicy::Immediate
    }

    /// Create a fixed delay policy.
    pub fn fixed(delay: Duration) -> Self {
        ReconnectPolicy::Fixed(FixedInterval::new(delay))
    }

    /// Create an exponential backoff policy doubling from `initial_delay` up to `max_delay`.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        ReconnectPolicy::Exponential(
            ExponentialBackoff::new(initial_delay)
                .multiplier(2.0)
                .max_interval(max_delay),
        )
    }

    /// Create an exponential backoff policy with randomization.
    ///
    /// # Arguments
    /// * `initial_delay` - Starting delay
    /// * `max_delay` - Maximum delay cap
    /// * `randomization_factor` - Randomization factor (0.0 to 1.0)
    pub fn exponential_random(
        initial_delay: Duration,
        max_delay: Duration,
        randomization_factor: f64,
    ) -> Self {
        ReconnectPolicy::ExponentialRandom(
            ExponentialRandomBackoff::new(initial_delay, randomization_factor)
                .multiplier(2.0)
                .max_interval(max_delay),
        )
    }

    /// Create a policy from any interval function.
    pub fn custom<I>(interval: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        ReconnectPolicy::Custom(Arc::new(interval))
    }

    /// Create a policy from a closure mapping the retry number to a delay.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Self::custom(FnInterval::new(f))
    }

    /// Returns the delay before retry number `retry` (0-indexed), or `None`
    /// when the retry should run without waiting.
    pub fn delay_for_retry(&self, retry: usize) -> Option<Duration> {
        let delay = match self {
            ReconnectPolicy::Immediate => return None,
            ReconnectPolicy::Fixed(interval) => interval.next_interval(retry),
            ReconnectPolicy::Exponential(backoff) => backoff.next_interval(retry),
            ReconnectPolicy::ExponentialRandom(backoff) => backoff.next_interval(retry),
            ReconnectPolicy::Custom(func) => func.next_interval(retry),
        };
        (!delay.is_zero()).then_some(delay)
    }
}

impl std::fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "ReconnectPolicy::Immediate"),
            Self::Fixed(_) => write!(f, "ReconnectPolicy::Fixed"),
            Self::Exponential(_) => write!(f, "ReconnectPolicy::Exponential"),
            Self::ExponentialRandom(_) => write!(f, "ReconnectPolicy::ExponentialRandom"),
            Self::Custom(_) => write!(f, "ReconnectPolicy::Custom"),
        }
    }
}
