//! Checkout and return of pooled connections.
//!
//! A pool lends out [`Conn`]s by value through [`acquire`]. After a unit of
//! work, the caller hands the connection back with [`Conn::release`] together
//! with the error (if any) the work produced, and a predicate deciding
//! whether that error means the connection must be discarded rather than
//! reused.
//!
//! ```text
//!   Idle --acquire--> InUse --release(keep)----> Idle
//!                          \--release(discard)-> Removed
//!   Idle --pool reaper (is_stale)--------------> Removed
//! ```
//!
//! Errors from the pool are passed through untouched; nothing here retries.
//! Because `release` consumes the connection, releasing it twice does not
//! compile.

use std::future::Future;

use async_trait::async_trait;

use crate::conn::Conn;
use crate::transport::Transport;

/// The narrow capability a pool exposes to the checkout protocol.
///
/// How the pool stores idle connections, limits its size, dials and evicts
/// is its own business.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Transport type of the connections this pool manages.
    type Transport: Transport;

    /// Error type reported by the pool.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Check out a connection, either idle or newly dialed.
    async fn get(&self) -> Result<Checkout<Self::Transport>, Self::Error>;

    /// Return a connection to the reusable set.
    async fn put(&self, conn: Conn<Self::Transport>) -> Result<(), Self::Error>;

    /// Discard a connection; the pool closes its transport.
    async fn remove(&self, conn: Conn<Self::Transport>) -> Result<(), Self::Error>;
}

/// A checked-out connection.
#[derive(Debug)]
pub struct Checkout<T> {
    /// The connection, exclusively owned by the caller until released.
    pub conn: Conn<T>,
    /// `true` if the pool dialed this connection for this checkout, `false`
    /// if it was reused from the idle set. New connections may need a
    /// protocol handshake before use.
    pub is_new: bool,
}

impl<T> Checkout<T> {
    /// Split into the connection and the `is_new` flag.
    pub fn into_parts(self) -> (Conn<T>, bool) {
        (self.conn, self.is_new)
    }
}

/// Where a released connection ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Back in the pool's reusable set.
    Returned,
    /// Removed from the pool and closed.
    Discarded,
}

impl Released {
    /// Whether the connection went back to the pool.
    #[must_use]
    pub fn is_returned(self) -> bool {
        matches!(self, Self::Returned)
    }
}

/// Lifecycle state of a connection relative to its pool.
///
/// Not tracked by [`Conn`] itself; pools that keep per-connection
/// bookkeeping can use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Held by the pool, unused.
    Idle,
    /// Checked out by a caller.
    InUse,
    /// Discarded or evicted. Terminal.
    Removed,
}

impl ConnState {
    /// State after a successful checkout, or `None` if the transition is
    /// not allowed.
    #[must_use]
    pub fn acquire(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::InUse),
            Self::InUse | Self::Removed => None,
        }
    }

    /// State after a release with the given outcome, or `None` if the
    /// connection was not checked out.
    #[must_use]
    pub fn release(self, outcome: Released) -> Option<Self> {
        match (self, outcome) {
            (Self::InUse, Released::Returned) => Some(Self::Idle),
            (Self::InUse, Released::Discarded) => Some(Self::Removed),
            _ => None,
        }
    }

    /// State after the pool's reaper evicts an idle connection.
    #[must_use]
    pub fn evict(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Removed),
            Self::InUse | Self::Removed => None,
        }
    }
}

/// Check out a connection from `pool`.
///
/// Pool errors (exhaustion, dial failure) are returned unmodified.
pub async fn acquire<P>(pool: &P) -> Result<Checkout<P::Transport>, P::Error>
where
    P: Pool + ?Sized,
{
    tracing::trace!("acquiring connection from pool");
    let checkout = pool.get().await?;
    tracing::debug!(
        conn_id = %checkout.conn.id(),
        is_new = checkout.is_new,
        "connection checked out"
    );
    Ok(checkout)
}

impl<T: Transport> Conn<T> {
    /// Hand this connection back to `pool` after a unit of work.
    ///
    /// `err` is the error the work produced, if any. When
    /// `should_discard(err)` is true the connection is removed from the pool
    /// (which closes it) and the result is [`Released::Discarded`], or the
    /// pool's removal error. Otherwise the connection is put back and the
    /// result is [`Released::Returned`], or the pool's put error, in which
    /// case the connection was not returned.
    ///
    /// The predicate runs when `release` is called, not when the returned
    /// future is first polled. The future does not hold `err`, so it is
    /// `Send` whatever the error type.
    pub fn release<P, E, F>(
        self,
        pool: &P,
        err: Option<&E>,
        should_discard: F,
    ) -> impl Future<Output = Result<Released, P::Error>> + Send
    where
        P: Pool<Transport = T> + ?Sized,
        E: ?Sized,
        F: FnOnce(Option<&E>) -> bool,
    {
        let failed = err.is_some();
        let discard = should_discard(err);

        async move {
            let conn_id = self.id();
            tracing::trace!(%conn_id, failed, "releasing connection");

            if discard {
                tracing::debug!(%conn_id, "discarding connection");
                return match pool.remove(self).await {
                    Ok(()) => Ok(Released::Discarded),
                    Err(e) => {
                        tracing::warn!(
                            %conn_id,
                            error = %e,
                            "failed to remove connection from pool"
                        );
                        Err(e)
                    }
                };
            }

            match pool.put(self).await {
                Ok(()) => Ok(Released::Returned),
                Err(e) => {
                    tracing::warn!(
                        %conn_id,
                        error = %e,
                        "failed to return connection to pool"
                    );
                    Err(e)
                }
            }
        }
    }
}
