//! # connpool
//!
//! The connection-wrapper layer of a network connection pool.
//!
//! A [`Conn`] wraps one physical transport, tracks when it was last used and
//! arms per-operation read/write deadlines. [`acquire`] and
//! [`Conn::release`] move connections between a [`Pool`] and the caller, and
//! on release decide, through a caller-supplied predicate, whether the
//! connection goes back to the pool or is discarded.
//!
//! The pool itself is a narrow trait (`get`, `put`, `remove`); its idle
//! storage, sizing, dialing and eviction sweeps live behind it.
//!
//! ## Features
//!
//! - Lock-free last-used timestamp, readable by idle scanners mid-checkout
//! - Staleness and max-lifetime checks
//! - Absolute read/write deadlines over any tokio stream
//! - Per-call discard policy, with common predicates in [`discard`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use connpool::{acquire, discard};
//!
//! let checkout = acquire(&pool).await?;
//! let mut conn = checkout.conn;
//! conn.set_write_timeout(Duration::from_secs(5))?;
//! let result = conn.write(b"PING\r\n").await;
//!
//! let released = conn
//!     .release(&pool, result.as_ref().err(), discard::on_broken_transport)
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod conn;
pub mod discard;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod usage;

pub use config::ConnConfig;
pub use conn::{Conn, ConnId};
pub use error::PoolError;
pub use protocol::{Checkout, ConnState, Pool, Released, acquire};
pub use transport::{StreamTransport, TcpTransport, Transport};
pub use usage::UsageHandle;
