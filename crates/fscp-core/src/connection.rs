//! Per-peer connection state machines.
//!
//! A [`Connection`] is the public handle; all protocol state lives in a
//! single task that owns the sessions and consumes messages from a bounded
//! queue. Cross-task communication is channels and watch signals only:
//!
//! ```text
//! dispatch loop ──incoming──▶ ┌────────────────┐ ──read queue──▶ read()
//! write() ──────write queue─▶ │ connection task │ ──datagrams──▶ transport
//! close() ──────closed──────▶ └────────────────┘
//! ```
//!
//! The handshake walks NEW → SYNCING (HELLO) → AUTHENTICATING
//! (PRESENTATION) → NEGOTIATING (SESSION_REQUEST / SESSION) → READY (DATA),
//! and only ever backwards to CLOSED. A rekey re-runs the NEGOTIATING
//! exchange while the connection stays READY on the old session until the
//! new one is confirmed.

use crate::addr::Addr;
use crate::error::Error;
use crate::message::{
    DataMessage, HelloMessage, HostIdentifier, Message, PresentationMessage, SessionMessage,
    SessionRequestMessage,
};
use crate::retrier::Retrier;
use crate::security::{find_common, ClientSecurity, RemoteSecurity};
use crate::session::Session;
use fscp_crypto::Certificate;
use fscp_transport::Datagram;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// Capacity of the incoming frame queue fed by the dispatch loop. Overflow
/// drops frames, as UDP would.
pub const INCOMING_QUEUE_CAPACITY: usize = 10;

/// Capacity of the decrypted application read queue.
pub const READ_QUEUE_CAPACITY: usize = 100;

/// Capacity of the outgoing application write queue.
pub const WRITE_QUEUE_CAPACITY: usize = 100;

/// How often an unanswered HELLO request is re-sent.
pub const HELLO_RETRY_PERIOD: Duration = Duration::from_secs(3);

/// How often a KEEP-ALIVE is sent on an established session.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(10);

/// The channel application writes are sent on.
pub const DATA_CHANNEL: u8 = 1;

/// The lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Created, nothing sent yet.
    New,
    /// HELLO requests are in flight.
    Syncing,
    /// The HELLO exchange paired up; PRESENTATION sent.
    Authenticating,
    /// Session parameters are being negotiated.
    Negotiating,
    /// An active session is serving data.
    Ready,
    /// The connection is closed.
    Closed,
}

enum Command {
    Rekey,
}

/// A peer-to-peer secure channel.
///
/// Obtained from an endpoint's `connect` or `accept`; never constructed
/// directly. All methods may be called from any task.
pub struct Connection {
    shared: Arc<Shared>,
    incoming_tx: mpsc::Sender<Message>,
    write_tx: mpsc::Sender<Vec<u8>>,
    read_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    command_tx: mpsc::Sender<Command>,
}

impl Connection {
    pub(crate) fn new(
        local_addr: Addr,
        remote_addr: Addr,
        transport: Arc<dyn Datagram>,
        host_identifier: HostIdentifier,
        security: ClientSecurity,
    ) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_QUEUE_CAPACITY);
        let (read_tx, read_rx) = mpsc::channel(READ_QUEUE_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(1);
        let (connected_tx, connected_rx) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            local_addr,
            remote_addr,
            state: Mutex::new(ConnectionState::New),
            session_number: Mutex::new(None),
            close_reason: Mutex::new(None),
            connected_rx,
            closed_tx,
        });

        let task = ConnectionTask {
            shared: Arc::clone(&shared),
            writer: MessageWriter {
                transport,
                remote: remote_addr.socket_addr(),
            },
            security,
            local_host_identifier: host_identifier,
            remote_host_identifier: None,
            remote_security: None,
            state: ConnectionState::New,
            hello_unique_number: rand::random(),
            hello_retrier: None,
            active: None,
            active_session_message: None,
            pending: None,
            pending_session_message: None,
            incoming: incoming_rx,
            outgoing: write_rx,
            commands: command_rx,
            read_tx,
            connected_tx,
        };

        tokio::spawn(task.run());

        Arc::new(Self {
            shared,
            incoming_tx,
            write_tx,
            read_rx: tokio::sync::Mutex::new(read_rx),
            command_tx,
        })
    }

    /// The local address of the connection.
    #[must_use]
    pub fn local_addr(&self) -> Addr {
        self.shared.local_addr
    }

    /// The remote address of the connection.
    #[must_use]
    pub fn remote_addr(&self) -> Addr {
        self.shared.remote_addr
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().expect("state lock")
    }

    /// Whether the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.shared.closed_tx.borrow()
    }

    /// Why the connection closed, if it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<String> {
        self.shared.close_reason.lock().expect("close reason lock").clone()
    }

    /// The number of the active session, once one is established. Advances
    /// when a rekey completes.
    #[must_use]
    pub fn active_session_number(&self) -> Option<u32> {
        *self.shared.session_number.lock().expect("session number lock")
    }

    /// Read one decrypted application datagram.
    ///
    /// Returns [`Error::Closed`] once the connection is closed and the
    /// queue is drained.
    pub async fn read(&self) -> Result<Vec<u8>, Error> {
        self.read_rx.lock().await.recv().await.ok_or(Error::Closed)
    }

    /// Write one application datagram.
    ///
    /// Suspends until the connection is READY and the outgoing queue has
    /// room; fails with [`Error::Closed`] once the connection is closed.
    pub async fn write(&self, data: &[u8]) -> Result<(), Error> {
        self.wait_connected().await?;

        let mut closed = self.shared.closed_tx.subscribe();

        tokio::select! {
            permit = self.write_tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(data.to_vec());
                    Ok(())
                }
                Err(_) => Err(Error::Closed),
            },
            _ = closed.wait_for(|closed| *closed) => Err(Error::Closed),
        }
    }

    /// Initiate a rekey: request a new session numbered one above the
    /// active one. The old session keeps serving data until the peer
    /// confirms the new one.
    pub async fn rekey(&self) -> Result<(), Error> {
        self.command_tx
            .send(Command::Rekey)
            .await
            .map_err(|_| Error::Closed)
    }

    /// Close the connection. Idempotent: closing twice is indistinguishable
    /// from closing once.
    pub fn close(&self) {
        self.shared.close_with_error(Error::Closed);
    }

    /// Wait until the connection becomes READY for the first time.
    ///
    /// Returns [`Error::Closed`] if it closes first. Dropping the future
    /// merely stops waiting; it does not close the connection.
    pub async fn wait_connected(&self) -> Result<(), Error> {
        let mut connected = self.shared.connected_rx.clone();
        let mut closed = self.shared.closed_tx.subscribe();

        tokio::select! {
            result = connected.wait_for(|connected| *connected) => {
                result.map(|_| ()).map_err(|_| Error::Closed)
            }
            _ = closed.wait_for(|closed| *closed) => Err(Error::Closed),
        }
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut closed = self.shared.closed_tx.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Hand one parsed message to the state machine. Overflow drops the
    /// frame, as the transport would.
    pub(crate) fn enqueue(&self, message: Message) {
        if self.incoming_tx.try_send(message).is_err() {
            trace!(
                remote = %self.shared.remote_addr,
                "incoming frame queue is full, dropping frame"
            );
        }
    }
}

struct Shared {
    local_addr: Addr,
    remote_addr: Addr,
    state: Mutex<ConnectionState>,
    session_number: Mutex<Option<u32>>,
    close_reason: Mutex<Option<String>>,
    connected_rx: watch::Receiver<bool>,
    closed_tx: watch::Sender<bool>,
}

impl Shared {
    /// Record the first close cause, mark the connection CLOSED and fire
    /// the closed signal. Later calls are no-ops.
    fn close_with_error(&self, error: Error) {
        let mut reason = self.close_reason.lock().expect("close reason lock");

        if reason.is_none() {
            debug!(
                local = %self.local_addr,
                remote = %self.remote_addr,
                "closing connection: {error}"
            );

            *reason = Some(error.to_string());
            *self.state.lock().expect("state lock") = ConnectionState::Closed;
            drop(reason);

            let _ = self.closed_tx.send(true);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock().expect("state lock");

        if *current != ConnectionState::Closed {
            *current = state;
        }
    }
}

#[derive(Clone)]
struct MessageWriter {
    transport: Arc<dyn Datagram>,
    remote: SocketAddr,
}

impl MessageWriter {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        debug!(remote = %self.remote, "sending {message}");

        let datagram = message.serialize()?;
        self.transport.send_to(&datagram, self.remote).await?;

        Ok(())
    }

    async fn send_raw(&self, datagram: &[u8]) -> Result<(), Error> {
        self.transport.send_to(datagram, self.remote).await?;

        Ok(())
    }
}

struct ConnectionTask {
    shared: Arc<Shared>,
    writer: MessageWriter,
    security: ClientSecurity,
    local_host_identifier: HostIdentifier,
    remote_host_identifier: Option<HostIdentifier>,
    remote_security: Option<RemoteSecurity>,
    state: ConnectionState,
    hello_unique_number: u32,
    hello_retrier: Option<Retrier>,
    active: Option<Session>,
    active_session_message: Option<Vec<u8>>,
    pending: Option<Session>,
    pending_session_message: Option<Vec<u8>>,
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Receiver<Vec<u8>>,
    commands: mpsc::Receiver<Command>,
    read_tx: mpsc::Sender<Vec<u8>>,
    connected_tx: watch::Sender<bool>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let writer = self.writer.clone();
        let unique_number = self.hello_unique_number;
        let failure_shared = Arc::clone(&self.shared);

        let retrier = Retrier::spawn(
            HELLO_RETRY_PERIOD,
            move || {
                let writer = writer.clone();

                async move {
                    writer
                        .send(&Message::HelloRequest(HelloMessage { unique_number }))
                        .await
                }
            },
            move |error| failure_shared.close_with_error(error),
        )
        .await;

        self.hello_retrier = Some(retrier);
        self.advance_state(ConnectionState::Syncing);

        let mut closed = self.shared.closed_tx.subscribe();
        let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let data_ready = self.state == ConnectionState::Ready && self.active.is_some();
            let session_established = self.active.is_some();

            let step = tokio::select! {
                closed_result = closed.changed() => {
                    if closed_result.is_err() || *closed.borrow() {
                        break;
                    }
                    Ok(())
                }
                message = self.incoming.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                data = self.outgoing.recv(), if data_ready => match data {
                    Some(data) => self.send_data(&data).await,
                    None => break,
                },
                _ = keepalive.tick(), if session_established => self.send_keepalive().await,
            };

            if let Err(error) = step {
                self.shared.close_with_error(error);
                break;
            }
        }

        if let Some(retrier) = &self.hello_retrier {
            retrier.stop();
        }

        // End of stream when nothing recorded a more precise cause.
        self.shared.close_with_error(Error::Closed);
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), Error> {
        debug!(
            local = %self.shared.local_addr,
            remote = %self.shared.remote_addr,
            "received {message}"
        );

        match message {
            Message::HelloRequest(hello) => self.on_hello_request(hello).await,
            Message::HelloResponse(hello) => self.on_hello_response(hello).await,
            Message::Presentation(presentation) => self.on_presentation(presentation).await,
            Message::SessionRequest(request) => self.on_session_request(request).await,
            Message::Session(session) => self.on_session(session).await,
            Message::Data(data) | Message::ContactRequest(data) | Message::Contact(data) => {
                self.on_data(&data, true);
                Ok(())
            }
            Message::KeepAlive(data) => {
                self.on_data(&data, false);
                Ok(())
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Rekey => {
                let Some(session_number) = self
                    .active
                    .as_ref()
                    .map(|active| active.session_number().wrapping_add(1))
                else {
                    return Ok(());
                };

                self.send_session_request(session_number).await
            }
        }
    }

    async fn on_hello_request(&mut self, hello: HelloMessage) -> Result<(), Error> {
        self.writer
            .send(&Message::HelloResponse(HelloMessage {
                unique_number: hello.unique_number,
            }))
            .await
    }

    async fn on_hello_response(&mut self, hello: HelloMessage) -> Result<(), Error> {
        if hello.unique_number != self.hello_unique_number {
            // Not an answer to our outstanding request.
            return Ok(());
        }

        let stopped = self
            .hello_retrier
            .as_ref()
            .is_some_and(Retrier::stop);

        if !stopped {
            // The retrier was already stopped: a previous response won.
            return Ok(());
        }

        self.advance_state(ConnectionState::Authenticating);

        self.writer
            .send(&Message::Presentation(PresentationMessage {
                certificate: self
                    .security
                    .certificate
                    .as_ref()
                    .map(|certificate| certificate.der().to_vec()),
            }))
            .await
    }

    async fn on_presentation(&mut self, presentation: PresentationMessage) -> Result<(), Error> {
        if self.remote_security.is_some() {
            trace!("ignoring repeated PRESENTATION");
            return Ok(());
        }

        let certificate = match presentation.certificate {
            Some(der) => match Certificate::from_der(&der) {
                Ok(certificate) => {
                    debug!(
                        "stored certificate ({}) for remote host",
                        certificate.subject()
                    );
                    Some(certificate)
                }
                Err(error) => {
                    warn!("dropping PRESENTATION with unusable certificate: {error}");
                    return Ok(());
                }
            },
            None => None,
        };

        self.remote_security = Some(RemoteSecurity { certificate });
        self.advance_state(ConnectionState::Negotiating);

        let session_number = self
            .pending
            .as_ref()
            .map_or(0, Session::session_number);

        self.send_session_request(session_number).await
    }

    async fn on_session_request(&mut self, request: SessionRequestMessage) -> Result<(), Error> {
        let unsigned = request.serialize_unsigned();

        if !self.verify_signature(&unsigned, &request.signature, "SESSION_REQUEST") {
            return Ok(());
        }

        if !self.pin_host_identifier(request.host_identifier) {
            return Ok(());
        }

        if self
            .active
            .as_ref()
            .is_some_and(|active| active.session_number() >= request.session_number)
        {
            return self.resend(self.active_session_message.clone()).await;
        }

        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.session_number() >= request.session_number)
        {
            return self.resend(self.pending_session_message.clone()).await;
        }

        let Some(cipher_suite) = find_common(
            self.security.supported_cipher_suites(),
            &request.cipher_suites,
        ) else {
            warn!("ignoring session request: no common cipher suite");
            return Ok(());
        };

        let Some(elliptic_curve) = find_common(
            self.security.supported_elliptic_curves(),
            &request.elliptic_curves,
        ) else {
            warn!("ignoring session request: no common elliptic curve");
            return Ok(());
        };

        debug!("selected cipher suite {cipher_suite}, elliptic curve {elliptic_curve}");

        let session = match Session::new(
            self.local_host_identifier,
            request.session_number,
            cipher_suite,
            elliptic_curve,
        ) {
            Ok(session) => session,
            Err(error) => {
                warn!("ignoring session request: {error}");
                return Ok(());
            }
        };

        self.install_pending_and_send(session).await
    }

    async fn on_session(&mut self, message: SessionMessage) -> Result<(), Error> {
        let unsigned = message.serialize_unsigned();

        if !self.verify_signature(&unsigned, &message.signature, "SESSION") {
            return Ok(());
        }

        if !self.pin_host_identifier(message.host_identifier) {
            return Ok(());
        }

        if let Some(active) = &self.active {
            if active.session_number() == message.session_number {
                // Both sides already agree; answering would ping-pong.
                return Ok(());
            }

            if active.session_number() > message.session_number {
                return self.resend(self.active_session_message.clone()).await;
            }
        }

        let matches_pending = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.session_number() == message.session_number);

        if !matches_pending {
            // The peer opened a session we did not request: adopt its
            // parameters, answer with our half, then complete it with the
            // key material at hand.
            if !self
                .security
                .supported_cipher_suites()
                .contains(&message.cipher_suite)
                || !self
                    .security
                    .supported_elliptic_curves()
                    .contains(&message.elliptic_curve)
            {
                warn!(
                    "ignoring SESSION with unacceptable parameters ({}, {})",
                    message.cipher_suite, message.elliptic_curve
                );
                return Ok(());
            }

            let session = match Session::new(
                self.local_host_identifier,
                message.session_number,
                message.cipher_suite,
                message.elliptic_curve,
            ) {
                Ok(session) => session,
                Err(error) => {
                    warn!("cannot answer SESSION {}: {error}", message.session_number);
                    return Ok(());
                }
            };

            self.install_pending_and_send(session).await?;
        }

        self.complete_pending(&message);

        Ok(())
    }

    fn on_data(&mut self, data: &DataMessage, deliver: bool) {
        let Some(active) = self.active.as_mut() else {
            debug!("dropping {data}: no active session");
            return;
        };

        match active.decrypt(data) {
            Ok(cleartext) => {
                if deliver && self.read_tx.try_send(cleartext).is_err() {
                    warn!(
                        remote = %self.shared.remote_addr,
                        "incoming application queue is full, dropping cleartext"
                    );
                }
            }
            Err(error) => warn!("dropping {data}: {error}"),
        }
    }

    async fn send_session_request(&mut self, session_number: u32) -> Result<(), Error> {
        let mut request = SessionRequestMessage {
            session_number,
            host_identifier: self.local_host_identifier,
            cipher_suites: self.security.supported_cipher_suites().to_vec(),
            elliptic_curves: self.security.supported_elliptic_curves().to_vec(),
            signature: Vec::new(),
        };
        request.signature = self.security.sign(&request.serialize_unsigned())?;

        self.writer.send(&Message::SessionRequest(request)).await
    }

    /// Install `session` as pending and send the matching SESSION message.
    /// The serialized message is kept around for later resends.
    async fn install_pending_and_send(&mut self, session: Session) -> Result<(), Error> {
        let mut message = SessionMessage {
            session_number: session.session_number(),
            host_identifier: self.local_host_identifier,
            cipher_suite: session.cipher_suite(),
            elliptic_curve: session.elliptic_curve(),
            public_key: session.public_key_pem().to_vec(),
            signature: Vec::new(),
        };
        message.signature = self.security.sign(&message.serialize_unsigned())?;

        let message = Message::Session(message);
        debug!(remote = %self.shared.remote_addr, "sending {message}");
        let datagram = message.serialize()?;

        self.writer.send_raw(&datagram).await?;

        self.pending = Some(session);
        self.pending_session_message = Some(datagram);
        self.advance_state(ConnectionState::Negotiating);

        Ok(())
    }

    /// Promote the pending session if `message` carries its other half.
    fn complete_pending(&mut self, message: &SessionMessage) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };

        let remote_identifier = self
            .remote_host_identifier
            .unwrap_or(message.host_identifier);

        if let Err(error) = pending.set_remote(remote_identifier, &message.public_key) {
            warn!(
                "cannot complete session {}: {error}",
                message.session_number
            );
            self.pending = Some(pending);
            return;
        }

        debug!(
            remote = %self.shared.remote_addr,
            "session {} established ({}, {})",
            pending.session_number(),
            pending.cipher_suite(),
            pending.elliptic_curve(),
        );

        *self
            .shared
            .session_number
            .lock()
            .expect("session number lock") = Some(pending.session_number());

        self.active = Some(pending);
        self.active_session_message = self.pending_session_message.take();
        self.advance_state(ConnectionState::Ready);

        let _ = self.connected_tx.send(true);
    }

    async fn send_data(&mut self, cleartext: &[u8]) -> Result<(), Error> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        let data = match active.encrypt(DATA_CHANNEL, cleartext) {
            Ok(data) => data,
            Err(error) => {
                warn!("dropping outgoing datagram: {error}");
                return Ok(());
            }
        };

        self.writer.send(&Message::Data(data)).await
    }

    async fn send_keepalive(&mut self) -> Result<(), Error> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        let data = match active.encrypt(0, &[]) {
            Ok(data) => data,
            Err(error) => {
                warn!("skipping keep-alive: {error}");
                return Ok(());
            }
        };

        self.writer.send(&Message::KeepAlive(data)).await
    }

    async fn resend(&self, datagram: Option<Vec<u8>>) -> Result<(), Error> {
        match datagram {
            Some(datagram) => self.writer.send_raw(&datagram).await,
            None => Ok(()),
        }
    }

    fn verify_signature(&self, unsigned: &[u8], signature: &[u8], what: &str) -> bool {
        let Some(remote) = &self.remote_security else {
            warn!("dropping {what}: no remote credentials known yet");
            return false;
        };

        if let Err(error) = self.security.verify(remote, unsigned, signature) {
            warn!("{what} signature verification failed: {error}");
            return false;
        }

        true
    }

    /// Pin the remote host identifier on first sight; a mismatch afterwards
    /// rejects the message.
    fn pin_host_identifier(&mut self, identifier: HostIdentifier) -> bool {
        match self.remote_host_identifier {
            None => {
                self.remote_host_identifier = Some(identifier);
                true
            }
            Some(known) if known == identifier => true,
            Some(known) => {
                warn!("dropping message from mismatching host identifier {identifier} (pinned {known})");
                false
            }
        }
    }

    fn advance_state(&mut self, target: ConnectionState) {
        if self.state < target && self.state != ConnectionState::Closed {
            self.state = target;
            self.shared.set_state(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(ConnectionState::New < ConnectionState::Syncing);
        assert!(ConnectionState::Syncing < ConnectionState::Authenticating);
        assert!(ConnectionState::Authenticating < ConnectionState::Negotiating);
        assert!(ConnectionState::Negotiating < ConnectionState::Ready);
        assert!(ConnectionState::Ready < ConnectionState::Closed);
    }
}
