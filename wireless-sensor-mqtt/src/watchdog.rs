//! Stall detection for the measurement stream.

use std::time::Duration;

use tokio::time::Instant;

/// Whether the stream is still considered alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogStatus {
    Alive,
    /// Terminal.
    Expired,
}

/// Tracks the time since the last valid measurement.
///
/// Uses the tokio clock, so paused-time tests can drive it.
#[derive(Debug)]
pub struct Watchdog {
    last_valid_at: Instant,
    timeout: Duration,
    status: WatchdogStatus,
}

impl Watchdog {
    /// Start a watchdog that is alive as of now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_valid_at: Instant::now(),
            timeout,
            status: WatchdogStatus::Alive,
        }
    }

    /// Record a valid measurement. Has no effect once expired.
    pub fn reset(&mut self) {
        if self.status == WatchdogStatus::Expired {
            tracing::warn!("Ignoring reset of expired watchdog");
            return;
        }
        self.last_valid_at = Instant::now();
    }

    /// Check for a stall, expiring the watchdog if the timeout has elapsed.
    pub fn is_expired(&mut self) -> bool {
        if self.status == WatchdogStatus::Alive && self.last_valid_at.elapsed() >= self.timeout {
            self.status = WatchdogStatus::Expired;
        }
        self.status == WatchdogStatus::Expired
    }

    pub fn status(&self) -> WatchdogStatus {
        self.status
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Instant at which the watchdog expires unless reset.
    pub fn deadline(&self) -> Instant {
        self.last_valid_at + self.timeout
    }

    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_timeout() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        assert!(!watchdog.is_expired());

        tokio::time::advance(TIMEOUT - Duration::from_secs(1)).await;
        assert!(!watchdog.is_expired());
        assert_eq!(watchdog.remaining(), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(watchdog.is_expired());
        assert_eq!(watchdog.status(), WatchdogStatus::Expired);
        assert_eq!(watchdog.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_pushes_deadline() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        let first_deadline = watchdog.deadline();

        tokio::time::advance(Duration::from_secs(1800)).await;
        watchdog.reset();
        assert!(!watchdog.is_expired());
        assert_eq!(watchdog.deadline(), first_deadline + Duration::from_secs(1800));

        tokio::time::advance(Duration::from_secs(2400)).await;
        assert!(!watchdog.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_is_terminal() {
        let mut watchdog = Watchdog::new(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(watchdog.is_expired());

        watchdog.reset();
        assert!(watchdog.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_deadline() {
        let mut watchdog = Watchdog::new(Duration::from_secs(90));
        tokio::time::sleep_until(watchdog.deadline()).await;
        assert!(watchdog.is_expired());
    }
}
