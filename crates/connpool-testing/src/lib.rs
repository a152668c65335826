//! # connpool-testing
//!
//! Test infrastructure for the `connpool` crate.
//!
//! ## Features
//!
//! - [`MockTransport`]: scripted transport recording deadlines, writes and
//!   close calls, with failure injection
//! - [`MockPool`]: bounded pool with call counters, dial/put/remove failure
//!   paths and an idle reaper
//!
//! ## Example
//!
//! ```rust,ignore
//! use connpool::{acquire, discard};
//! use connpool_testing::MockPool;
//!
//! let pool = MockPool::new(4);
//! let checkout = acquire(&pool).await?;
//! checkout.conn.release(&pool, None::<&std::io::Error>, discard::never).await?;
//! assert_eq!(pool.stats().puts(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_pool;
pub mod mock_transport;

pub use mock_pool::{MockPool, MockPoolStats};
pub use mock_transport::{MockTransport, MockTransportHandle};
