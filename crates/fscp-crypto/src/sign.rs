//! Handshake message signing and verification.
//!
//! SESSION_REQUEST and SESSION messages are signed over their unsigned
//! prefix. In certificate mode the signature is RSA-PSS with SHA-256 and a
//! 32-byte salt (the salt length is mandatory for wire compatibility with
//! the legacy freelan implementation). In preshared-key mode it is an
//! HMAC-SHA256 over the same bytes.

use crate::error::CryptoError;
use crate::PSS_SALT_LENGTH;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Sign `cleartext` with RSA-PSS-SHA256.
pub fn sign_pss(key: &RsaPrivateKey, cleartext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let hashed = Sha256::digest(cleartext);

    key.sign_with_rng(
        &mut OsRng,
        Pss::new_with_salt::<Sha256>(PSS_SALT_LENGTH),
        &hashed,
    )
    .map_err(|e| CryptoError::Signature(e.to_string()))
}

/// Verify an RSA-PSS-SHA256 signature over `cleartext`.
pub fn verify_pss(
    key: &RsaPublicKey,
    cleartext: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let hashed = Sha256::digest(cleartext);

    key.verify(
        Pss::new_with_salt::<Sha256>(PSS_SALT_LENGTH),
        &hashed,
        signature,
    )
    .map_err(|_| CryptoError::BadSignature)
}

/// Sign `cleartext` with HMAC-SHA256 under the preshared key.
#[must_use]
pub fn sign_hmac(key: &[u8], cleartext: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(cleartext);

    mac.finalize().into_bytes().to_vec()
}

/// Verify an HMAC-SHA256 signature over `cleartext` in constant time.
pub fn verify_hmac(key: &[u8], cleartext: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(cleartext);

    mac.verify_slice(signature).map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 2048).unwrap()
    }

    #[test]
    fn test_pss_round_trip() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);

        let signature = sign_pss(&key, b"signed payload").unwrap();
        verify_pss(&public, b"signed payload", &signature).unwrap();
    }

    #[test]
    fn test_pss_rejects_tampered_payload() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);

        let signature = sign_pss(&key, b"signed payload").unwrap();

        assert!(matches!(
            verify_pss(&public, b"tampered payload", &signature),
            Err(CryptoError::BadSignature)
        ));
    }

    #[test]
    fn test_pss_rejects_wrong_key() {
        let key = test_key();
        let other = RsaPublicKey::from(&test_key());

        let signature = sign_pss(&key, b"signed payload").unwrap();

        assert!(verify_pss(&other, b"signed payload", &signature).is_err());
    }

    #[test]
    fn test_hmac_round_trip() {
        let signature = sign_hmac(b"preshared key", b"signed payload");

        assert_eq!(signature.len(), 32);
        verify_hmac(b"preshared key", b"signed payload", &signature).unwrap();
    }

    #[test]
    fn test_hmac_rejects_tampering() {
        let mut signature = sign_hmac(b"preshared key", b"signed payload");

        assert!(verify_hmac(b"preshared key", b"other payload", &signature).is_err());

        signature[0] ^= 0x01;
        assert!(verify_hmac(b"preshared key", b"signed payload", &signature).is_err());
    }

    #[test]
    fn test_hmac_rejects_wrong_key() {
        let signature = sign_hmac(b"preshared key", b"signed payload");

        assert!(matches!(
            verify_hmac(b"another key", b"signed payload", &signature),
            Err(CryptoError::BadSignature)
        ));
    }
}
