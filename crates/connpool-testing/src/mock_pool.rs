//! A bounded in-memory pool of [`MockTransport`] connections.
//!
//! [`MockPool`] implements [`Pool`] with the minimum of real behavior needed
//! to exercise the checkout protocol: an idle queue, a connection cap, dialing
//! on demand, and an idle reaper driven by [`Conn::should_evict`]. Every call
//! is counted and failures can be injected.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use connpool::{Checkout, Conn, ConnConfig, ConnId, Pool, PoolError, UsageHandle};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::mock_transport::{MockTransport, MockTransportHandle};

#[derive(Debug, Default)]
struct PoolState {
    idle: VecDeque<Conn<MockTransport>>,
    open: usize,
    closed: bool,
    dial_failure: Option<io::ErrorKind>,
    dialed: Vec<MockTransportHandle>,
    usage: Vec<(ConnId, UsageHandle)>,
}

/// Call counters for a [`MockPool`].
#[derive(Debug, Default)]
pub struct MockPoolStats {
    gets: AtomicUsize,
    puts: AtomicUsize,
    removes: AtomicUsize,
    reaped: AtomicUsize,
}

impl MockPoolStats {
    /// Calls to `get`, including failed ones.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::Relaxed)
    }

    /// Calls to `put`, including failed ones.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    /// Calls to `remove`, including failed ones.
    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::Relaxed)
    }

    /// Idle connections evicted by [`MockPool::reap`].
    pub fn reaped(&self) -> usize {
        self.reaped.load(Ordering::Relaxed)
    }
}

/// A bounded pool of mock connections.
#[derive(Debug)]
pub struct MockPool {
    max_connections: usize,
    config: ConnConfig,
    state: Mutex<PoolState>,
    stats: MockPoolStats,
}

impl MockPool {
    /// Create a pool allowing at most `max_connections` open connections.
    pub fn new(max_connections: usize) -> Self {
        Self::with_config(max_connections, ConnConfig::default())
    }

    /// Create a pool whose reaper evicts according to `config`.
    pub fn with_config(max_connections: usize, config: ConnConfig) -> Self {
        Self {
            max_connections,
            config,
            state: Mutex::new(PoolState::default()),
            stats: MockPoolStats::default(),
        }
    }

    /// Call counters.
    pub fn stats(&self) -> &MockPoolStats {
        &self.stats
    }

    /// Connections currently open, idle or checked out.
    pub fn open_connections(&self) -> usize {
        self.state.lock().open
    }

    /// Connections currently idle.
    pub fn idle_connections(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Inspection handles for every transport dialed so far, in dial order.
    pub fn dialed(&self) -> Vec<MockTransportHandle> {
        self.state.lock().dialed.clone()
    }

    /// Fail the next dial with `kind`.
    pub fn fail_next_dial(&self, kind: io::ErrorKind) {
        self.state.lock().dial_failure = Some(kind);
    }

    /// Close the pool: later `get` and `put` calls fail with
    /// [`PoolError::PoolClosed`], and connections handed to `put` are closed.
    pub fn close(&self) {
        self.state.lock().closed = true;
        tracing::info!("mock pool closed");
    }

    /// Last-used time of every open connection, checked out or not.
    ///
    /// Reads the shared usage slots, so it can run while callers are doing
    /// I/O on their checked-out connections.
    pub fn usage_snapshot(&self) -> Vec<(ConnId, Instant)> {
        self.state
            .lock()
            .usage
            .iter()
            .map(|(id, usage)| (*id, usage.last_used()))
            .collect()
    }

    /// Evict idle connections that are stale or past their lifetime, closing
    /// each. Returns how many were evicted.
    pub async fn reap(&self) -> usize {
        let evicted: Vec<_> = {
            let mut state = self.state.lock();
            let (evict, keep): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.idle)
                .into_iter()
                .partition(|conn| conn.should_evict(&self.config));
            state.idle = keep;
            for conn in &evict {
                forget_conn(&mut state, conn.id());
            }
            evict.into_iter().collect()
        };

        let count = evicted.len();
        for mut conn in evicted {
            tracing::debug!(conn_id = %conn.id(), "reaping idle connection");
            if let Err(e) = conn.close().await {
                tracing::warn!(
                    conn_id = %conn.id(),
                    error = %e,
                    "failed to close reaped connection"
                );
            }
        }
        self.stats.reaped.fetch_add(count, Ordering::Relaxed);
        count
    }

    fn dial(state: &mut PoolState) -> Result<Conn<MockTransport>, PoolError> {
        if let Some(kind) = state.dial_failure.take() {
            return Err(PoolError::ConnectionCreation(io::Error::new(
                kind,
                "dial failed",
            )));
        }
        let port = u16::try_from(state.dialed.len() % usize::from(u16::MAX)).unwrap_or(0) + 1;
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), port);
        let (transport, handle) = MockTransport::new(peer);
        let conn = Conn::new(transport);

        state.dialed.push(handle);
        state.usage.push((conn.id(), conn.usage_handle()));
        state.open += 1;
        Ok(conn)
    }
}

fn forget_conn(state: &mut PoolState, id: ConnId) {
    state.usage.retain(|(tracked, _)| *tracked != id);
    state.open = state.open.saturating_sub(1);
}

#[async_trait]
impl Pool for MockPool {
    type Transport = MockTransport;
    type Error = PoolError;

    async fn get(&self) -> Result<Checkout<MockTransport>, PoolError> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        if let Some(conn) = state.idle.pop_front() {
            return Ok(Checkout {
                conn,
                is_new: false,
            });
        }

        if state.open >= self.max_connections {
            return Err(PoolError::Exhausted {
                max: self.max_connections,
            });
        }

        let conn = Self::dial(&mut state)?;
        Ok(Checkout { conn, is_new: true })
    }

    async fn put(&self, conn: Conn<MockTransport>) -> Result<(), PoolError> {
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        let mut rejected = {
            let mut state = self.state.lock();
            if !state.closed {
                state.idle.push_back(conn);
                return Ok(());
            }
            forget_conn(&mut state, conn.id());
            conn
        };

        if let Err(e) = rejected.close().await {
            tracing::warn!(
                conn_id = %rejected.id(),
                error = %e,
                "failed to close connection returned to closed pool"
            );
        }
        Err(PoolError::PoolClosed)
    }

    async fn remove(&self, mut conn: Conn<MockTransport>) -> Result<(), PoolError> {
        self.stats.removes.fetch_add(1, Ordering::Relaxed);
        forget_conn(&mut self.state.lock(), conn.id());
        conn.close().await.map_err(PoolError::ConnectionClose)
    }
}
