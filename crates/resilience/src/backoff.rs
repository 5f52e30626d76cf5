// crates/resilience/src/backoff.rs
//! Exponential backoff parameters and per-invocation backoff state

use std::time::Duration;

/// Parameters controlling retry delays and per-attempt timeouts
///
/// Delays and timeouts grow geometrically after every failed attempt and
/// are capped at their respective maximums. `total_timeout` bounds the
/// whole retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSettings {
    /// Delay before the first retry
    pub initial_retry_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    pub retry_delay_multiplier: f64,
    /// Upper bound for the delay
    pub max_retry_delay: Duration,
    /// Timeout of the first attempt
    pub initial_rpc_timeout: Duration,
    /// Factor applied to the attempt timeout after each failed attempt
    pub rpc_timeout_multiplier: f64,
    /// Upper bound for the attempt timeout
    pub max_rpc_timeout: Duration,
    /// Time budget for all attempts together
    pub total_timeout: Duration,
}

impl BackoffSettings {
    /// Creates settings with the given total budget and default growth
    pub fn new(total_timeout: Duration) -> Self {
        Self {
            total_timeout,
            ..Self::default()
        }
    }

    /// Sets the retry delay parameters
    pub fn with_delays(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.initial_retry_delay = initial;
        self.retry_delay_multiplier = multiplier;
        self.max_retry_delay = max;
        self
    }

    /// Sets the per-attempt timeout parameters
    pub fn with_rpc_timeouts(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.initial_rpc_timeout = initial;
        self.rpc_timeout_multiplier = multiplier;
        self.max_rpc_timeout = max;
        self
    }

    /// Sets the total timeout
    pub fn with_total_timeout(mut self, total: Duration) -> Self {
        self.total_timeout = total;
        self
    }

    /// Iterates the delays slept between consecutive attempts
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial_retry_delay), move |d| {
            Some(grow(*d, self.retry_delay_multiplier, self.max_retry_delay))
        })
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(100),
            retry_delay_multiplier: 1.3,
            max_retry_delay: Duration::from_secs(60),
            initial_rpc_timeout: Duration::from_secs(20),
            rpc_timeout_multiplier: 1.0,
            max_rpc_timeout: Duration::from_secs(20),
            total_timeout: Duration::from_secs(600),
        }
    }
}

/// Working set of one retrying invocation
///
/// Never shared between invocations; only the retry loop mutates it.
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    settings: &'a BackoffSettings,
    delay: Duration,
    rpc_timeout: Duration,
}

impl<'a> Backoff<'a> {
    /// Starts a backoff sequence at the initial delay and attempt timeout
    pub fn new(settings: &'a BackoffSettings) -> Self {
        Self {
            settings,
            delay: settings.initial_retry_delay,
            rpc_timeout: settings.initial_rpc_timeout,
        }
    }

    /// Delay to sleep after the current failed attempt
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Timeout for the current attempt
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Grows delay and attempt timeout; called after each failed attempt
    pub fn advance(&mut self) {
        let s = self.settings;
        self.delay = grow(self.delay, s.retry_delay_multiplier, s.max_retry_delay);
        self.rpc_timeout = grow(self.rpc_timeout, s.rpc_timeout_multiplier, s.max_rpc_timeout);
    }
}

/// `min(current * multiplier, cap)`, saturating to `cap` on overflow or NaN
fn grow(current: Duration, multiplier: f64, cap: Duration) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * multiplier).map_or(cap, |d| d.min(cap))
}
