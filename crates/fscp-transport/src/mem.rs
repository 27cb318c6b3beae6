//! An in-process datagram network for deterministic tests.
//!
//! Every [`MemoryTransport`] registers its address in a shared routing
//! table. Delivery is lossless and ordered per sender, which makes protocol
//! state machines testable without sockets or timing assumptions. Sending
//! to an unregistered address silently discards the datagram, matching UDP
//! semantics for unreachable peers.

use crate::datagram::{Datagram, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Router = Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>>>;

/// A shared in-process datagram network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    router: Arc<Router>,
}

impl MemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport on `addr`, replacing any previous registration.
    #[must_use]
    pub fn endpoint(&self, addr: SocketAddr) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.router.lock().expect("router lock").insert(addr, tx);

        MemoryTransport {
            router: Arc::clone(&self.router),
            addr,
            incoming: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
        }
    }
}

/// One endpoint of a [`MemoryNetwork`].
pub struct MemoryTransport {
    router: Arc<Router>,
    addr: SocketAddr,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    closed: AtomicBool,
}

#[async_trait]
impl Datagram for MemoryTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let destination = self.router.lock().expect("router lock").get(&addr).cloned();

        if let Some(tx) = destination {
            // A dropped receiver behaves like an unreachable peer.
            let _ = tx.send((buf.to_vec(), self.addr));
        }

        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let received = self.incoming.lock().await.recv().await;

        match received {
            Some((data, from)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok((n, from))
            }
            None => Err(TransportError::Closed),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.addr)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.router.lock().expect("router lock").remove(&self.addr);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}
