//! In-memory transport that records what the connection layer does to it.
//!
//! A [`MockTransport`] is moved into a [`Conn`](connpool::Conn) and from
//! there into and out of pools, so tests keep a [`MockTransportHandle`] to
//! inspect deadlines, written bytes and close calls, queue inbound data and
//! inject failures.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use connpool::Transport;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct TransportState {
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
    deadline_calls: usize,
    written: Vec<u8>,
    inbound: VecDeque<Vec<u8>>,
    closed: bool,
    close_calls: usize,
    fail_deadlines: Option<io::ErrorKind>,
    fail_writes: Option<io::ErrorKind>,
    fail_close: Option<io::ErrorKind>,
}

/// A scripted, inspectable [`Transport`].
#[derive(Debug)]
pub struct MockTransport {
    peer: SocketAddr,
    state: Arc<Mutex<TransportState>>,
}

/// Shared view of a [`MockTransport`]'s state.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    /// Create a transport connected to `peer`, with its inspection handle.
    pub fn new(peer: SocketAddr) -> (Self, MockTransportHandle) {
        let state = Arc::new(Mutex::new(TransportState::default()));
        let handle = MockTransportHandle {
            state: Arc::clone(&state),
        };
        (Self { peer, state }, handle)
    }
}

impl MockTransportHandle {
    /// Current read deadline.
    #[must_use]
    pub fn read_deadline(&self) -> Option<Instant> {
        self.state.lock().read_deadline
    }

    /// Current write deadline.
    #[must_use]
    pub fn write_deadline(&self) -> Option<Instant> {
        self.state.lock().write_deadline
    }

    /// Number of deadline-setting calls, failed ones included.
    #[must_use]
    pub fn deadline_calls(&self) -> usize {
        self.state.lock().deadline_calls
    }

    /// All bytes written so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Whether the transport has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of close calls, failed ones included.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    /// Queue a chunk to be returned by the next read.
    pub fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
        self.state.lock().inbound.push_back(chunk.into());
    }

    /// Make deadline-setting calls fail with `kind` (or succeed, with `None`).
    pub fn fail_deadlines(&self, kind: Option<io::ErrorKind>) {
        self.state.lock().fail_deadlines = kind;
    }

    /// Make writes fail with `kind` (or succeed, with `None`).
    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        self.state.lock().fail_writes = kind;
    }

    /// Make close fail with `kind` (or succeed, with `None`).
    pub fn fail_close(&self, kind: Option<io::ErrorKind>) {
        self.state.lock().fail_close = kind;
    }
}

enum ReadStep {
    Data(usize),
    Wait(Option<Instant>),
}

impl Transport for MockTransport {
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        let mut state = self.state.lock();
        state.deadline_calls += 1;
        check_usable(&state, state.fail_deadlines)?;
        state.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        let mut state = self.state.lock();
        state.deadline_calls += 1;
        check_usable(&state, state.fail_deadlines)?;
        state.write_deadline = deadline;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let step = {
            let mut state = self.state.lock();
            check_usable(&state, None)?;
            if state.read_deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(timed_out());
            }
            match state.inbound.pop_front() {
                Some(mut chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        state.inbound.push_front(chunk.split_off(n));
                    }
                    ReadStep::Data(n)
                }
                None => ReadStep::Wait(state.read_deadline),
            }
        };

        match step {
            ReadStep::Data(n) => Ok(n),
            ReadStep::Wait(Some(deadline)) => {
                tokio::time::sleep_until(deadline).await;
                Err(timed_out())
            }
            ReadStep::Wait(None) => std::future::pending().await,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        check_usable(&state, state.fail_writes)?;
        if state.write_deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(timed_out());
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        check_usable(&state, state.fail_close)?;
        state.closed = true;
        state.read_deadline = None;
        state.write_deadline = None;
        Ok(())
    }
}

fn check_usable(state: &TransportState, injected: Option<io::ErrorKind>) -> io::Result<()> {
    if state.closed {
        return Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "use of closed network connection",
        ));
    }
    match injected {
        Some(kind) => Err(io::Error::new(kind, "injected transport failure")),
        None => Ok(()),
    }
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}
