//! Bounded exponential reconnect backoff with full jitter.

use std::time::Duration;

use rand::RngExt;

use deskwire_core::config::realtime::RealtimeConfig;

/// Reconnect delay policy: exponential growth up to a cap, full jitter,
/// reset after a stable connected period.
#[derive(Debug)]
pub struct ReconnectBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    /// Creates a backoff from the realtime configuration.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.reconnect_initial_ms.max(1)),
            multiplier: config.reconnect_multiplier.max(1.0),
            max: Duration::from_millis(config.reconnect_max_ms.max(1)),
            attempt: 0,
        }
    }

    /// The delay before the next attempt, with full jitter applied.
    ///
    /// The undelayed base grows by `multiplier` per call and never exceeds
    /// the cap; the returned delay is uniform in `[0, base]`.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);
        let millis = base.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }

    /// The undelayed base for the upcoming attempt.
    pub fn base_delay(&self) -> Duration {
        let factor = self.multiplier.powi(self.attempt as i32);
        let millis = (self.initial.as_millis() as f64 * factor).round();
        if millis >= self.max.as_millis() as f64 {
            self.max
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resets growth back to the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
