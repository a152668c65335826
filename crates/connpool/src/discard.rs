//! Ready-made discard predicates for [`Conn::release`](crate::Conn::release).
//!
//! Any `FnOnce(Option<&E>) -> bool` works as a predicate; these cover the
//! common policies. Whether an error poisons a connection depends on the
//! caller's protocol, so none of them is applied by default.

use std::io;

/// Never discard; always return the connection to the pool.
pub fn never<E: ?Sized>(_err: Option<&E>) -> bool {
    false
}

/// Always discard.
pub fn always<E: ?Sized>(_err: Option<&E>) -> bool {
    true
}

/// Discard whenever the unit of work failed.
pub fn on_any_error<E: ?Sized>(err: Option<&E>) -> bool {
    err.is_some()
}

/// Discard when the error means the transport itself is unusable.
///
/// A timed-out read or write leaves the stream at an unknown position, so
/// timeouts count as broken too.
pub fn on_broken_transport(err: Option<&io::Error>) -> bool {
    err.is_some_and(is_broken_transport)
}

/// Whether `err` indicates a broken transport.
#[must_use]
pub fn is_broken_transport(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}
