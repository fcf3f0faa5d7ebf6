use std::time::Duration;

use serde::Deserialize;

use crate::error::LockError;
use crate::store::lease_secs;

/// Default key prefix; lock records live under `lock:<key>`.
pub const DEFAULT_PREFIX: &str = "lock";

/// Default lease applied when the caller does not pick one.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(20);

/// Default wait between acquisition attempts while contended.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-call acquisition parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// How long the store keeps the record before expiring it. Must be a
    /// positive whole number of seconds.
    pub lease: Duration,

    /// How long to keep retrying under contention. Zero means a single
    /// attempt.
    pub timeout: Duration,

    /// Pause between attempts while waiting.
    pub poll_interval: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            timeout: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl AcquireOptions {
    /// Build options from integer units: lease and timeout in seconds, poll
    /// interval in microseconds.
    pub fn from_units(lease_secs: u64, timeout_secs: u64, poll_interval_micros: u64) -> Self {
        Self {
            lease: Duration::from_secs(lease_secs),
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_micros(poll_interval_micros),
        }
    }

    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reject parameters the store cannot honor.
    pub fn validate(&self) -> Result<(), LockError> {
        lease_secs(self.lease)?;
        if self.poll_interval.is_zero() {
            return Err(LockError::InvalidArgument(
                "poll interval must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Lock-wide settings, embeddable in a host application's configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Namespace prepended to every lock key.
    pub prefix: String,

    /// Default lease in seconds.
    pub lease_secs: u64,

    /// Default acquisition timeout in seconds.
    pub timeout_secs: u64,

    /// Default poll interval in microseconds.
    pub poll_interval_micros: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
            lease_secs: DEFAULT_LEASE.as_secs(),
            timeout_secs: 0,
            poll_interval_micros: 100_000,
        }
    }
}

impl LockConfig {
    /// Acquisition options built from the configured defaults.
    pub fn options(&self) -> AcquireOptions {
        AcquireOptions::from_units(
            self.lease_secs,
            self.timeout_secs,
            self.poll_interval_micros,
        )
    }
}
