//! Connection timeout configuration.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::PoolError;

/// Timeouts applied to pooled connections.
///
/// A zero duration disables the corresponding limit. This struct is marked
/// `#[non_exhaustive]` to allow adding new fields in future minor versions
/// without breaking changes. Use the builder methods or
/// [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ConnConfig {
    /// Deadline offset for each read; zero means reads never time out.
    pub read_timeout: Duration,

    /// Deadline offset for each write; zero means writes never time out.
    pub write_timeout: Duration,

    /// Idle time after which a connection is stale; zero disables staleness.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection; zero means unlimited.
    pub max_lifetime: Duration,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl ConnConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the idle (staleness) timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Validate the configuration.
    ///
    /// Every duration must be representable as an offset from the current
    /// instant, otherwise deadlines derived from it cannot be computed.
    pub fn validate(&self) -> Result<(), PoolError> {
        let now = Instant::now();
        for (name, value) in [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("idle_timeout", self.idle_timeout),
            ("max_lifetime", self.max_lifetime),
        ] {
            if now.checked_add(value).is_none() {
                return Err(PoolError::Configuration(format!(
                    "{name} of {value:?} is too large"
                )));
            }
        }
        Ok(())
    }
}
