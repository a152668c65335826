//! Raw transport abstraction.
//!
//! [`Transport`] is the capability a pooled connection needs from the
//! physical connection underneath it: deadline-guarded reads and writes, a
//! peer address and close. [`StreamTransport`] implements it over any tokio
//! stream, enforcing deadlines with [`tokio::time::timeout_at`].
//!
//! Deadlines are absolute points in time. Setting one never blocks; a pending
//! read or write fails with [`io::ErrorKind::TimedOut`] once it passes, and
//! one started after it has passed fails without touching the stream.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::Instant;

/// A physical connection that can be pooled.
///
/// The I/O methods return `Send` futures so that pool implementations built
/// on `#[async_trait]` can await them.
pub trait Transport: Send + 'static {
    /// Set the absolute deadline for future reads; `None` clears it.
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    /// Set the absolute deadline for future writes; `None` clears it.
    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    /// Read into `buf`, returning the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Write from `buf`, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Address of the remote peer.
    fn remote_addr(&self) -> io::Result<SocketAddr>;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// A [`Transport`] over a tokio byte stream.
///
/// After [`close`](Transport::close) every operation, including a second
/// close, fails with [`io::ErrorKind::NotConnected`].
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: Option<S>,
    peer: SocketAddr,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

/// A [`StreamTransport`] over TCP.
pub type TcpTransport = StreamTransport<TcpStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established stream connected to `peer`.
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
            read_deadline: None,
            write_deadline: None,
        }
    }

    /// The current read deadline, if any.
    #[must_use]
    pub fn read_deadline(&self) -> Option<Instant> {
        self.read_deadline
    }

    /// The current write deadline, if any.
    #[must_use]
    pub fn write_deadline(&self) -> Option<Instant> {
        self.write_deadline
    }

    /// Whether [`close`](Transport::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream_mut(&mut self) -> io::Result<&mut S> {
        self.stream.as_mut().ok_or_else(closed_error)
    }
}

impl TcpTransport {
    /// Dial a TCP connection to `addr`.
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        tracing::debug!(%peer, "dialed tcp transport");
        Ok(Self::new(stream, peer))
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.stream_mut()?;
        self.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.stream_mut()?;
        self.write_deadline = deadline;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = self.read_deadline;
        let stream = self.stream_mut()?;
        with_deadline(deadline, stream.read(buf)).await
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let deadline = self.write_deadline;
        let stream = self.stream_mut()?;
        with_deadline(deadline, stream.write(buf)).await
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut stream = self.stream.take().ok_or_else(closed_error)?;
        self.read_deadline = None;
        self.write_deadline = None;
        stream.shutdown().await
    }
}

async fn with_deadline<F>(deadline: Option<Instant>, io: F) -> io::Result<usize>
where
    F: Future<Output = io::Result<usize>>,
{
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(deadline_exceeded()),
        Some(deadline) => match tokio::time::timeout_at(deadline, io).await {
            Ok(result) => result,
            Err(_) => Err(deadline_exceeded()),
        },
        None => io.await,
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}

fn closed_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "use of closed network connection",
    )
}
