//! The pooled connection wrapper.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ConnConfig;
use crate::transport::Transport;
use crate::usage::UsageHandle;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One physical connection plus the metadata a pool needs to manage it.
///
/// The wrapper owns its transport exclusively. Whoever holds a `Conn` (the
/// pool while idle, a caller while checked out) is the only party doing I/O
/// on it. The last-used timestamp is the exception: it lives in a shared
/// atomic slot so an idle scanner holding a [`UsageHandle`] can read it at any
/// time.
///
/// Every call to [`set_read_timeout`](Self::set_read_timeout) or
/// [`set_write_timeout`](Self::set_write_timeout) counts as activity and
/// advances the timestamp, even if setting the deadline then fails.
pub struct Conn<T> {
    id: ConnId,
    raw: T,
    created_at: Instant,
    usage: UsageHandle,
}

impl<T: Transport> Conn<T> {
    /// Wrap a freshly dialed or reclaimed transport. Last-used is now.
    pub fn new(raw: T) -> Self {
        let now = Instant::now();
        Self {
            id: ConnId::next(),
            raw,
            created_at: now,
            usage: UsageHandle::new(now),
        }
    }

    /// Identifier of this wrapper; stable across [`set_raw`](Self::set_raw).
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// The underlying transport.
    #[must_use]
    pub fn raw(&self) -> &T {
        &self.raw
    }

    /// Mutable access to the underlying transport.
    pub fn raw_mut(&mut self) -> &mut T {
        &mut self.raw
    }

    /// Replace the underlying transport, returning the previous one.
    ///
    /// The wrapper keeps its identity and last-used timestamp. The caller
    /// decides what to do with the old transport.
    pub fn set_raw(&mut self, raw: T) -> T {
        tracing::debug!(conn_id = %self.id, "replacing raw transport");
        std::mem::replace(&mut self.raw, raw)
    }

    /// When this wrapper was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since this wrapper was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// The most recent recorded use.
    #[must_use]
    pub fn last_used(&self) -> Instant {
        self.usage.last_used()
    }

    /// Record a use at `at`. Older timestamps than the stored one are ignored.
    pub fn mark_used(&self, at: Instant) {
        self.usage.mark_used(at);
    }

    /// A shared handle to the last-used slot, for idle scanners.
    #[must_use]
    pub fn usage_handle(&self) -> UsageHandle {
        self.usage.clone()
    }

    /// Whether the connection has been idle strictly longer than `timeout`.
    ///
    /// A zero timeout disables staleness.
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.usage.is_stale(timeout)
    }

    /// Whether the connection has outlived `max_lifetime`; zero means never.
    #[must_use]
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        !max_lifetime.is_zero() && self.age() > max_lifetime
    }

    /// Whether a pool should evict this connection under `config`.
    #[must_use]
    pub fn should_evict(&self, config: &ConnConfig) -> bool {
        self.is_stale(config.idle_timeout) || self.is_expired(config.max_lifetime)
    }

    /// Mark the connection used and arm (or clear) the read deadline.
    ///
    /// A non-zero `timeout` sets the deadline to now plus `timeout`; zero
    /// clears any existing deadline. Errors from the transport are returned
    /// unmodified.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let now = Instant::now();
        self.usage.mark_used(now);
        self.raw.set_read_deadline(deadline_after(now, timeout))
    }

    /// Mark the connection used and arm (or clear) the write deadline.
    ///
    /// Same semantics as [`set_read_timeout`](Self::set_read_timeout).
    pub fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let now = Instant::now();
        self.usage.mark_used(now);
        self.raw.set_write_deadline(deadline_after(now, timeout))
    }

    /// Apply both the read and write timeouts from `config`.
    pub fn apply_timeouts(&mut self, config: &ConnConfig) -> io::Result<()> {
        self.set_read_timeout(config.read_timeout)?;
        self.set_write_timeout(config.write_timeout)
    }

    /// Read from the transport.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.raw.read(buf).await
    }

    /// Write to the transport, exactly as the transport reports it.
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.raw.write(buf).await
    }

    /// Address of the remote peer.
    pub fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.raw.remote_addr()
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> io::Result<()> {
        tracing::debug!(conn_id = %self.id, "closing connection");
        self.raw.close().await
    }
}

impl<T> fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("last_used", &self.usage.last_used())
            .finish_non_exhaustive()
    }
}

// A timeout too large to represent has no reachable deadline.
fn deadline_after(now: Instant, timeout: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        None
    } else {
        now.checked_add(timeout)
    }
}
