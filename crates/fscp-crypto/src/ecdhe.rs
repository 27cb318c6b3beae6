//! Ephemeral elliptic-curve Diffie-Hellman key agreement.
//!
//! A fresh keypair is generated on the negotiated curve for every session.
//! Public keys travel in SESSION messages as PEM-encoded SubjectPublicKeyInfo
//! blocks; the encoding must stay byte-exact (line wrapping and trailing
//! newline included) because the PEM bytes are covered by the message
//! signature.
//!
//! The shared secret handed to the key derivation is the x coordinate of the
//! multiplied point, and is zeroized as soon as it goes out of scope.

use crate::error::CryptoError;
use crate::suite::EllipticCurve;
use p384::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// An ephemeral ECDHE keypair on one of the supported curves.
pub enum EcdheKeyPair {
    /// A keypair on SECP384R1.
    P384(p384::ecdh::EphemeralSecret),
    /// A keypair on SECP521R1.
    P521(p521::ecdh::EphemeralSecret),
}

impl EcdheKeyPair {
    /// Generate a fresh keypair on the given curve.
    ///
    /// SECT571K1 is declared by the protocol but cannot be instantiated;
    /// requesting it (or any unknown identifier) yields
    /// [`CryptoError::UnsupportedCurve`].
    pub fn generate(curve: EllipticCurve) -> Result<Self, CryptoError> {
        match curve {
            EllipticCurve::SECP384R1 => {
                Ok(Self::P384(p384::ecdh::EphemeralSecret::random(&mut OsRng)))
            }
            EllipticCurve::SECP521R1 => {
                Ok(Self::P521(p521::ecdh::EphemeralSecret::random(&mut OsRng)))
            }
            other => Err(CryptoError::UnsupportedCurve(other)),
        }
    }

    /// The curve this keypair lives on.
    #[must_use]
    pub fn curve(&self) -> EllipticCurve {
        match self {
            Self::P384(_) => EllipticCurve::SECP384R1,
            Self::P521(_) => EllipticCurve::SECP521R1,
        }
    }

    /// The public half, PEM-encoded.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        let pem = match self {
            Self::P384(secret) => secret.public_key().to_public_key_pem(LineEnding::LF),
            Self::P521(secret) => secret.public_key().to_public_key_pem(LineEnding::LF),
        };

        pem.map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Agree with a peer's PEM-encoded public key.
    ///
    /// Returns the x coordinate of the shared point. The buffer zeroizes
    /// itself on drop; callers must not let it outlive key derivation.
    pub fn agree(&self, peer_public_key_pem: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self {
            Self::P384(secret) => {
                let peer = p384::PublicKey::from_public_key_pem(peer_public_key_pem)
                    .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
                let shared = secret.diffie_hellman(&peer);

                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            Self::P521(secret) => {
                let peer = p521::PublicKey::from_public_key_pem(peer_public_key_pem)
                    .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
                let shared = secret.diffie_hellman(&peer);

                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
        }
    }
}
