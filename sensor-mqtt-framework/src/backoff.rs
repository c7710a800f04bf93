//! Exponential delay between reconnect attempts.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

use sensor_mqtt_common::ReconnectConfig;

/// Capped exponential backoff with an attempt counter.
///
/// The delay sequence comes from [`backon`]; this type only counts attempts
/// and starts the sequence over on [`reset`](Self::reset).
#[derive(Debug)]
pub struct Backoff {
    builder: ExponentialBuilder,
    delays: ExponentialBackoff,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let builder = ExponentialBuilder::default()
            .with_min_delay(initial.min(max))
            .with_max_delay(max)
            .with_factor(multiplier as f32)
            .without_max_times();

        Self {
            delays: builder.build(),
            builder,
            max,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay(), config.multiplier)
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.delays.next().unwrap_or(self.max)
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.delays = self.builder.build();
        self.attempts = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_with_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 2.0);

        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_constant_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(60), 1.0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_never_runs_out() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0);
        let last = (0..1000).map(|_| backoff.next_delay()).last();
        assert_eq!(last, Some(Duration::from_secs(60)));
    }
}
