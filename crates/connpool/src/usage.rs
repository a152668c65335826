//! Lock-free last-used timestamp tracking.
//!
//! A pooled connection's activity timestamp is the one piece of state read
//! outside the checkout window: the caller holding the connection advances it
//! on every deadline-setting call while a pool's idle scanner may be reading
//! it at the same time. [`UsageHandle`] stores it as an [`AtomicU64`] offset
//! from an immutable epoch so every read observes a complete write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Shared, cloneable view of a connection's last-used timestamp.
///
/// Cloning the handle shares the same slot, so an idle scanner can keep a
/// handle while the connection itself is checked out.
#[derive(Debug, Clone)]
pub struct UsageHandle {
    inner: Arc<UsageSlot>,
}

#[derive(Debug)]
struct UsageSlot {
    /// Creation instant; offsets are measured from here.
    epoch: Instant,
    /// Nanoseconds since `epoch` of the most recent use.
    offset_nanos: AtomicU64,
}

impl UsageHandle {
    /// Create a slot whose last-used time is `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            inner: Arc::new(UsageSlot {
                epoch: now,
                offset_nanos: AtomicU64::new(0),
            }),
        }
    }

    /// The most recently recorded use.
    #[must_use]
    pub fn last_used(&self) -> Instant {
        let nanos = self.inner.offset_nanos.load(Ordering::Acquire);
        self.inner.epoch + Duration::from_nanos(nanos)
    }

    /// Record a use at `at`.
    ///
    /// The timestamp only ever moves forward: a value older than the one
    /// already stored (or older than the slot's creation) is ignored.
    pub fn mark_used(&self, at: Instant) {
        let offset = at.saturating_duration_since(self.inner.epoch);
        let nanos = u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX);
        self.inner.offset_nanos.fetch_max(nanos, Ordering::AcqRel);
    }

    /// Time elapsed between the last use and `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used())
    }

    /// Whether the connection has been idle strictly longer than `timeout`
    /// as of `now`.
    ///
    /// A zero timeout disables staleness.
    #[must_use]
    pub fn is_stale_at(&self, now: Instant, timeout: Duration) -> bool {
        !timeout.is_zero() && self.idle_for(now) > timeout
    }

    /// Whether the connection has been idle strictly longer than `timeout`.
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.is_stale_at(Instant::now(), timeout)
    }
}
