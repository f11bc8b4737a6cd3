//! Supervision settings shared by every server supervisor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for retries, health checks, and shutdown.
///
/// Every field has a default, so a partial document deserializes. An
/// interval of `0` disables the corresponding periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Delay before the first automatic retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on any retry delay, in milliseconds.
    ///
    /// Delays double until they reach the cap and then stay there. With the
    /// defaults that happens from the seventh failure on, so a server with a
    /// larger retry budget sees equal gaps between its last attempts.
    pub backoff_cap_ms: u64,
    /// Ping cadence for running servers, in milliseconds.
    pub health_check_interval_ms: u64,
    /// Deadline for a single ping, in milliseconds.
    pub ping_timeout_ms: u64,
    /// Cadence of catalog rediscovery on running servers, in milliseconds.
    pub rediscovery_interval_ms: u64,
    /// Time allowed beyond the server timeout for a stop, in milliseconds.
    pub stop_grace_ms: u64,
    /// Deadline for the best-effort runtime status write, in milliseconds.
    pub status_write_timeout_ms: u64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            health_check_interval_ms: 30_000,
            ping_timeout_ms: 5_000,
            rediscovery_interval_ms: 0,
            stop_grace_ms: 2_000,
            status_write_timeout_ms: 2_000,
        }
    }
}

impl SupervisionConfig {
    /// Returns the retry schedule.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }

    /// Returns the ping cadence, or `None` when pinging is disabled.
    #[must_use]
    pub const fn health_check_interval(&self) -> Option<Duration> {
        non_zero_millis(self.health_check_interval_ms)
    }

    /// Returns the ping deadline.
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Returns the rediscovery cadence, or `None` when disabled.
    #[must_use]
    pub const fn rediscovery_interval(&self) -> Option<Duration> {
        non_zero_millis(self.rediscovery_interval_ms)
    }

    /// Returns the extra time allowed for a stop.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Returns the deadline for runtime status writes.
    #[must_use]
    pub const fn status_write_timeout(&self) -> Duration {
        Duration::from_millis(self.status_write_timeout_ms)
    }
}

const fn non_zero_millis(value: u64) -> Option<Duration> {
    if value == 0 {
        None
    } else {
        Some(Duration::from_millis(value))
    }
}

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Creates a policy. A cap below `base` is raised to `base`.
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        let effective_cap = if cap.as_nanos() < base.as_nanos() {
            base
        } else {
            cap
        };
        Self {
            base,
            cap: effective_cap,
        }
    }

    /// Returns the delay before retry number `failures`, where `1` is the
    /// retry after the first failure: `min(base * 2^(failures - 1), cap)`.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}
