//! The UDP transport.

use crate::datagram::{Datagram, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Kernel buffer size requested for the socket in each direction.
const SOCKET_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// A UDP datagram transport.
///
/// The socket is created through `socket2` so the kernel buffers can be
/// sized for bursty traffic before it is handed to tokio.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    closed: Arc<AtomicBool>,
}

impl UdpTransport {
    /// Bind a UDP socket on `addr`. Use a port of 0 for automatic selection.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket =
            socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
                .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_recv_buffer_size(SOCKET_BUFFER_SIZE)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_send_buffer_size(SOCKET_BUFFER_SIZE)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        Ok(Self {
            socket: Arc::new(socket),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Datagram for UdpTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        Ok(self.socket.send_to(buf, addr).await?)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        Ok(self.socket.recv_from(buf).await?)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.is_ipv4());
    }

    #[tokio::test]
    async fn test_send_recv_loopback() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let sent = client
            .send_to(b"one datagram", server.local_addr().unwrap())
            .await
            .unwrap();
        assert_eq!(sent, 12);

        let mut buf = vec![0u8; 1500];
        let (size, from) = timeout(Duration::from_secs(1), server.recv_from(&mut buf))
            .await
            .expect("timed out")
            .unwrap();

        assert_eq!(&buf[..size], b"one datagram");
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        assert!(!transport.is_closed());
        transport.close();
        assert!(transport.is_closed());

        let result = transport
            .send_to(b"late", "127.0.0.1:9".parse().unwrap())
            .await;
        assert!(matches!(result, Err(TransportError::Closed)));

        let mut buf = [0u8; 16];
        assert!(matches!(
            transport.recv_from(&mut buf).await,
            Err(TransportError::Closed)
        ));
    }
}
