//! Error types for the FSCP protocol engine.

use fscp_crypto::{CipherSuite, CryptoError, EllipticCurve};
use thiserror::Error;

/// Top-level protocol errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A message could not be encoded or decoded.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// A session operation failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A security configuration or signature operation failed.
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] fscp_transport::TransportError),

    /// An I/O error occurred.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection or endpoint is closed. This is the end-of-stream
    /// condition surfaced by `read`, `accept` and waiters.
    #[error("connection is closed")]
    Closed,

    /// An operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,

    /// An address was given for a network other than `"fscp"`.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// An address string could not be resolved.
    #[error("cannot resolve address `{0}`")]
    UnresolvableAddress(String),
}

/// Message codec errors.
///
/// Every variant names the part of the datagram whose decoding failed, so
/// that dropped datagrams can be diagnosed from the logs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The datagram is shorter than the fixed message header.
    #[error("message header requires 4 bytes but only {0} are available")]
    ShortHeader(usize),

    /// The version byte is not 3.
    #[error("unexpected message version {0} when 3 was expected")]
    BadVersion(u8),

    /// The type byte does not map to any message type.
    #[error("unknown message type 0x{0:02x}")]
    UnknownType(u8),

    /// The buffer does not match the declared payload length.
    #[error("payload is declared as {expected} byte(s) but {got} are available")]
    ShortPayload {
        /// The declared payload length.
        expected: usize,
        /// The bytes actually available.
        got: usize,
    },

    /// A payload field could not be decoded.
    #[error("decoding field `{field}`: {cause}")]
    BadField {
        /// The field being decoded.
        field: &'static str,
        /// Why decoding failed.
        cause: String,
    },
}

/// Session-level errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A DATA message carried a sequence number at or below the last
    /// accepted one.
    #[error("outdated sequence number {got} (last accepted {last})")]
    OutdatedSequence {
        /// The received sequence number.
        got: u32,
        /// The last accepted sequence number.
        last: u32,
    },

    /// AEAD authentication failed when opening a DATA message.
    #[error("AEAD authentication failed")]
    AeadAuthFailure,

    /// `set_remote` was called again with different key material.
    #[error("remote key material is already set")]
    RemoteAlreadyPinned,

    /// The negotiated elliptic curve cannot be instantiated.
    #[error("unsupported elliptic curve: {0}")]
    UnsupportedCurve(EllipticCurve),

    /// The negotiated cipher suite is unknown.
    #[error("unsupported cipher suite: {0}")]
    UnsupportedCipherSuite(CipherSuite),

    /// The peer's public key could not be decoded.
    #[error("invalid remote public key: {0}")]
    InvalidRemoteKey(String),

    /// The session has no remote key material yet.
    #[error("session is not ready for data transfer")]
    NotReady,

    /// The cleartext does not fit a single datagram.
    #[error("cleartext of {0} byte(s) exceeds the maximum message payload")]
    PayloadTooLarge(usize),
}

impl From<CryptoError> for SessionError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::UnsupportedCurve(curve) => Self::UnsupportedCurve(curve),
            CryptoError::InvalidPublicKey(cause) => Self::InvalidRemoteKey(cause),
            CryptoError::Aead => Self::AeadAuthFailure,
            other => Self::InvalidRemoteKey(other.to_string()),
        }
    }
}

/// Security profile errors.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A certificate was configured without its private key.
    #[error("a certificate was provided but not its associated private key")]
    MissingPrivateKey,

    /// The cipher suite preference list is empty.
    #[error("at least one cipher suite must be supported")]
    NoCipherSuites,

    /// The elliptic curve preference list is empty.
    #[error("at least one elliptic curve must be supported")]
    NoEllipticCurves,

    /// A signature cannot be verified because no remote credentials are
    /// known yet.
    #[error("no remote credentials are available to verify the signature")]
    MissingRemoteCredentials,

    /// No signing credentials are configured.
    #[error("no signing credentials are configured")]
    MissingCredentials,

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
