//! # FSCP Core
//!
//! The FSCP (Freelan Secure Channel Protocol) peer-to-peer protocol engine:
//! a UDP-based secure channel layering authenticated key agreement and
//! AEAD-encrypted framing over a datagram transport.
//!
//! This crate provides:
//! - the bit-exact message codec (version 3 framing)
//! - the per-peer connection state machine (HELLO → PRESENTATION →
//!   SESSION_REQUEST → SESSION → DATA)
//! - per-session key derivation, AEAD encryption and strict-monotone
//!   anti-replay
//! - the endpoint that owns the socket and demultiplexes datagrams to
//!   connections
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Endpoint                             │
//! │  (socket owner, per-remote registry, accept backlog)         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                        Connections                           │
//! │  (one state-machine task per peer, owning the sessions)      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                         Messages                             │
//! │  (bit-exact codec, one message per datagram)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod connection;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod retrier;
pub mod security;
pub mod session;

pub use addr::{resolve_addr, Addr, DEFAULT_PORT, NETWORK};
pub use connection::{Connection, ConnectionState};
pub use endpoint::Endpoint;
pub use error::{Error, MessageError, SecurityError, SessionError};
pub use message::{HostIdentifier, Message, MessageType};
pub use retrier::Retrier;
pub use security::{ClientSecurity, RemoteSecurity};
pub use session::Session;

pub use fscp_crypto::{CipherSuite, EllipticCurve};
