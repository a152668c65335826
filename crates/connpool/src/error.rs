//! Pool error types.

use thiserror::Error;

/// Errors a pool implementation can report.
///
/// The acquire/release protocol never produces these itself; it returns
/// whatever error type the [`Pool`](crate::Pool) uses, unmodified. This enum
/// is the stock choice for pools that have no richer error type, and is also
/// returned by [`ConnConfig::validate`](crate::ConnConfig::validate).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every connection is checked out and no new one may be dialed.
    #[error("pool exhausted: maximum connections ({max}) in use")]
    Exhausted {
        /// Maximum allowed connections.
        max: usize,
    },

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Dialing a new connection failed.
    #[error("failed to create connection: {0}")]
    ConnectionCreation(#[source] std::io::Error),

    /// Closing a removed connection failed.
    #[error("failed to close connection: {0}")]
    ConnectionClose(#[source] std::io::Error),

    /// Configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}
