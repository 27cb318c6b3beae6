//! The FSCP endpoint: socket owner, demultiplexer and connection registry.
//!
//! One dispatch task drives the datagram transport single-reader style. For
//! every received datagram it resolves or creates the connection for the
//! origin address, parses the message and hands it to that connection's
//! state machine. Fully handshaken incoming connections surface on a
//! bounded accept backlog.

use crate::addr::Addr;
use crate::connection::Connection;
use crate::error::Error;
use crate::message::{HostIdentifier, Message};
use crate::security::ClientSecurity;
use fscp_transport::{Datagram, UdpTransport};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use tokio::sync::{mpsc, watch};

/// Capacity of the accept backlog. A connection completing its handshake
/// while the backlog is full is closed.
pub const BACKLOG_CAPACITY: usize = 20;

/// Size of the datagram receive buffer. Anything larger is truncated by the
/// transport and dropped at parse time.
pub const RECEIVE_BUFFER_SIZE: usize = 1500;

/// The default deadline applied by [`Endpoint::connect_timeout`] callers
/// that do not have a better one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct Registry {
    connections: HashMap<SocketAddr, Arc<Connection>>,
    closed: bool,
}

struct Inner {
    transport: Arc<dyn Datagram>,
    local_addr: Addr,
    host_identifier: HostIdentifier,
    security: ClientSecurity,
    registry: Mutex<Registry>,
    backlog_tx: mpsc::Sender<Arc<Connection>>,
    backlog_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<Connection>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// An FSCP endpoint bound to a local address.
///
/// Cheap to clone; all clones share the same socket and registry.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

impl Endpoint {
    /// Bind a UDP socket on `addr` and start dispatching.
    ///
    /// The security profile is validated first; a profile with neither a
    /// certificate nor a preshared key receives a temporary self-signed
    /// certificate.
    pub async fn listen(addr: Addr, security: ClientSecurity) -> Result<Self, Error> {
        let transport = UdpTransport::bind(addr.socket_addr()).await?;

        Self::with_transport(Arc::new(transport), security)
    }

    /// Start an endpoint over an already-bound transport.
    ///
    /// This is how tests run the full protocol over an in-memory network.
    pub fn with_transport(
        transport: Arc<dyn Datagram>,
        mut security: ClientSecurity,
    ) -> Result<Self, Error> {
        security.validate()?;

        let local_addr = Addr::from(transport.local_addr()?);
        let (backlog_tx, backlog_rx) = mpsc::channel(BACKLOG_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        let endpoint = Self {
            inner: Arc::new(Inner {
                transport,
                local_addr,
                host_identifier: HostIdentifier::generate(),
                security,
                registry: Mutex::new(Registry {
                    connections: HashMap::new(),
                    closed: false,
                }),
                backlog_tx,
                backlog_rx: tokio::sync::Mutex::new(backlog_rx),
                shutdown_tx,
            }),
        };

        tokio::spawn(endpoint.clone().dispatch_loop());

        Ok(endpoint)
    }

    /// The bound local address.
    #[must_use]
    pub fn local_addr(&self) -> Addr {
        self.inner.local_addr
    }

    /// This endpoint's host identifier.
    #[must_use]
    pub fn host_identifier(&self) -> HostIdentifier {
        self.inner.host_identifier
    }

    /// Accept the next fully handshaken incoming connection.
    ///
    /// Returns [`Error::Closed`] once the endpoint is closed.
    pub async fn accept(&self) -> Result<Arc<Connection>, Error> {
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let mut backlog = self.inner.backlog_rx.lock().await;

        tokio::select! {
            connection = backlog.recv() => connection.ok_or(Error::Closed),
            _ = shutdown.wait_for(|closed| *closed) => Err(Error::Closed),
        }
    }

    /// Connect to `remote`.
    ///
    /// Registers (or reuses) the connection for the remote address; a newly
    /// created connection is awaited until it becomes READY or closes.
    /// Dropping the returned future stops waiting without closing the
    /// connection.
    pub async fn connect(&self, remote: Addr) -> Result<Arc<Connection>, Error> {
        let (connection, created) = self
            .get_or_insert(remote.socket_addr())
            .ok_or(Error::Closed)?;

        if created {
            connection.wait_connected().await?;
        }

        Ok(connection)
    }

    /// [`Endpoint::connect`] bounded by a deadline.
    pub async fn connect_timeout(
        &self,
        remote: Addr,
        timeout: Duration,
    ) -> Result<Arc<Connection>, Error> {
        tokio::time::timeout(timeout, self.connect(remote))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Close the endpoint: stop dispatching, block further registration and
    /// close every connection.
    pub fn close(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.transport.close();
    }

    async fn dispatch_loop(self) {
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => break,
                received = self.inner.transport.recv_from(&mut buffer) => match received {
                    Ok((size, from)) => self.handle_datagram(&buffer[..size], from),
                    Err(error) => {
                        debug!("endpoint receive failed: {error}");
                        break;
                    }
                },
            }
        }

        self.finalize();
    }

    fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        // The registry may refuse new peers while shutting down.
        let Some((connection, created)) = self.get_or_insert(from) else {
            return;
        };

        if created {
            self.watch_for_backlog(Arc::clone(&connection));
        }

        match Message::parse(datagram) {
            Ok(message) => connection.enqueue(message),
            Err(error) => debug!("dropping malformed datagram from {from}: {error}"),
        }
    }

    /// Once a dispatch-created connection completes its handshake, offer it
    /// to the accept backlog; a full backlog closes the newcomer.
    fn watch_for_backlog(&self, connection: Arc<Connection>) {
        let backlog = self.inner.backlog_tx.clone();

        tokio::spawn(async move {
            if connection.wait_connected().await.is_err() {
                // Closed before the handshake completed.
                return;
            }

            if connection.is_closed() {
                return;
            }

            if backlog.try_send(Arc::clone(&connection)).is_err() {
                debug!(
                    remote = %connection.remote_addr(),
                    "accept backlog is full, closing connection"
                );
                connection.close();
            }
        });
    }

    /// Look up or create the connection for `remote`. Returns `None` when
    /// the registry refuses new entries because the endpoint is closing,
    /// and whether the connection was newly created.
    fn get_or_insert(&self, remote: SocketAddr) -> Option<(Arc<Connection>, bool)> {
        let mut registry = self.inner.registry.lock().expect("registry lock");

        if let Some(connection) = registry.connections.get(&remote) {
            return Some((Arc::clone(connection), false));
        }

        if registry.closed {
            return None;
        }

        let connection = Connection::new(
            self.inner.local_addr,
            Addr::from(remote),
            Arc::clone(&self.inner.transport),
            self.inner.host_identifier,
            self.inner.security.clone(),
        );

        registry
            .connections
            .insert(remote, Arc::clone(&connection));
        drop(registry);

        // Whatever happens to the connection, unregister it once it closes.
        let endpoint = self.clone();
        let watched = Arc::clone(&connection);
        tokio::spawn(async move {
            watched.closed().await;
            endpoint.remove(remote, &watched);
        });

        Some((connection, true))
    }

    fn remove(&self, remote: SocketAddr, connection: &Arc<Connection>) {
        let mut registry = self.inner.registry.lock().expect("registry lock");

        if let Some(current) = registry.connections.get(&remote) {
            if Arc::ptr_eq(current, connection) {
                registry.connections.remove(&remote);
            }
        }
    }

    /// Mark the registry closed and shut every connection down.
    fn finalize(&self) {
        let connections: Vec<Arc<Connection>> = {
            let mut registry = self.inner.registry.lock().expect("registry lock");
            registry.closed = true;
            registry.connections.values().cloned().collect()
        };

        for connection in connections {
            connection.close();
        }
    }
}
