//! Interval functions used to space out replacement attempts.

use std::sync::Arc;
use std::time::Duration;

/// Computes the delay before a retry.
pub trait IntervalFunction: Send + Sync {
    /// Returns the delay before retry number `retry` (0 for the first retry).
    fn next_interval(&self, retry: usize) -> Duration;
}

/// The same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a fixed interval.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _retry: usize) -> Duration {
        self.duration
    }
}

/// Exponentially growing delay, optionally capped.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff doubling from `initial_interval`.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: None,
        }
    }

    /// Sets the growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the delay.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn raw_interval(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let interval = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, retry: usize) -> Duration {
        self.raw_interval(retry)
    }
}

/// Exponential backoff with jitter, so that many controllers failing at once
/// do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    base: ExponentialBackoff,
    randomization_factor: f64,
}

impl ExponentialRandomBackoff {
    /// Creates a randomized exponential backoff.
    ///
    /// A `randomization_factor` of 0.5 spreads each delay uniformly between
    /// 50% and 150% of the exponential value. The factor is clamped to `0.0..=1.0`.
    pub fn new(initial_interval: Duration, randomization_factor: f64) -> Self {
        Self {
            base: ExponentialBackoff::new(initial_interval),
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
        }
    }

    /// Sets the growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.base = self.base.multiplier(multiplier);
        self
    }

    /// Caps the delay before randomization.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.base = self.base.max_interval(max_interval);
        self
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next_interval(&self, retry: usize) -> Duration {
        use rand::Rng;

        let center = self.base.raw_interval(retry).as_secs_f64();
        let delta = center * self.randomization_factor;
        if delta <= 0.0 {
            return Duration::try_from_secs_f64(center).unwrap_or(Duration::MAX);
        }

        let secs = rand::rng().random_range((center - delta)..=(center + delta));
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// An interval function backed by a closure.
#[derive(Clone)]
pub struct FnInterval {
    f: Arc<dyn Fn(usize) -> Duration + Send + Sync>,
}

impl FnInterval {
    /// Wraps a closure mapping the retry number to a delay.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl IntervalFunction for FnInterval {
    fn next_interval(&self, retry: usize) -> Duration {
        (self.f)(retry)
    }
}

impl std::fmt::Debug for FnInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnInterval")
    }
}
