//! The datagram transport trait.

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding the local address failed.
    #[error("failed to bind transport: {0}")]
    Bind(String),

    /// An I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was closed.
    #[error("transport is closed")]
    Closed,
}

/// A bidirectional, connectionless datagram transport.
///
/// Sends are independent datagrams and need no external serialization; the
/// receive side is meant to be driven by a single reader task.
#[async_trait]
pub trait Datagram: Send + Sync {
    /// Send one datagram to `addr`.
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, TransportError>;

    /// Receive one datagram, returning its size and origin. Datagrams larger
    /// than `buf` are truncated.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError>;

    /// The bound local address.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;

    /// Close the transport. Subsequent operations fail with
    /// [`TransportError::Closed`].
    fn close(&self);

    /// Whether the transport has been closed.
    fn is_closed(&self) -> bool;
}
