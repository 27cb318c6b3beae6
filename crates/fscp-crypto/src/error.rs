//! Error types for the FSCP cryptographic primitives.

use crate::suite::EllipticCurve;
use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The elliptic curve is declared by the protocol but not implementable.
    #[error("unsupported elliptic curve: {0}")]
    UnsupportedCurve(EllipticCurve),

    /// A session key of an unexpected length was supplied to the AEAD layer.
    #[error("invalid AEAD key length: {0} byte(s)")]
    InvalidKeyLength(usize),

    /// AEAD sealing or opening failed.
    #[error("AEAD operation failed")]
    Aead,

    /// A peer public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signature(String),

    /// A signature did not verify against the supplied data.
    #[error("signature verification failed")]
    BadSignature,

    /// An X.509 certificate could not be parsed or generated.
    #[error("certificate error: {0}")]
    Certificate(String),
}
