//! # FSCP Crypto
//!
//! Cryptographic primitives for the FSCP (Freelan Secure Channel Protocol)
//! implementation.
//!
//! This crate provides:
//! - The TLS 1.2 pseudo-random function used for session key derivation
//! - ECDHE key agreement over the NIST P-384 and P-521 curves
//! - AES-GCM authenticated encryption with a detached tag
//! - RSA-PSS and HMAC-SHA256 signing of handshake messages
//! - X.509 certificate handling, including temporary self-signed certificates
//! - PBKDF2 preshared-key derivation from a passphrase
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm |
//! |----------|-----------|
//! | Key Exchange | ECDHE (SECP384R1, SECP521R1) |
//! | Key Derivation | TLS 1.2 PRF with SHA-256 |
//! | AEAD | AES-128-GCM / AES-256-GCM |
//! | Signatures | RSA-PSS-SHA256 or HMAC-SHA256 |
//! | Preshared Keys | PBKDF2-HMAC-SHA256 |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod cert;
pub mod ecdhe;
pub mod error;
pub mod prf;
pub mod psk;
pub mod sign;
pub mod suite;

pub use aead::AeadCipher;
pub use cert::Certificate;
pub use ecdhe::EcdheKeyPair;
pub use error::CryptoError;
pub use suite::{CipherSuite, EllipticCurve};

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Size of the GCM authentication tag carried by DATA messages.
pub const TAG_SIZE: usize = 16;

/// Size of an AES-GCM nonce: an 8-byte prefix followed by a 4-byte
/// big-endian sequence number.
pub const NONCE_SIZE: usize = 12;

/// Size of the session IV prefix derived for each direction.
pub const IV_PREFIX_SIZE: usize = 8;

/// RSA-PSS salt length mandated for wire compatibility with the legacy
/// freelan implementation.
pub const PSS_SALT_LENGTH: usize = 32;
