//! AES-GCM authenticated encryption with a detached tag.
//!
//! FSCP transports the 16-byte GCM tag in its own wire field, separate from
//! the ciphertext, so the cipher here seals and opens with detached tags.
//! Nonces are composed by the session layer from an 8-byte derived prefix
//! and the 4-byte big-endian sequence number. Additional authenticated data
//! is always empty.

use crate::error::CryptoError;
use crate::{NONCE_SIZE, TAG_SIZE};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce, Tag};

/// An AES-GCM cipher keyed with a derived session key.
///
/// The variant is selected by the session key length, which follows the
/// negotiated cipher suite's block size.
pub enum AeadCipher {
    /// AES-128-GCM, for 16-byte session keys.
    Aes128(Aes128Gcm),
    /// AES-256-GCM, for 32-byte session keys.
    Aes256(Aes256Gcm),
}

impl AeadCipher {
    /// Create a cipher from a session key of 16 or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        match key.len() {
            16 => Ok(Self::Aes128(
                Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(16))?,
            )),
            32 => Ok(Self::Aes256(
                Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(32))?,
            )),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    /// Seal `cleartext`, returning the ciphertext and the detached tag.
    pub fn seal(
        &self,
        nonce: &[u8; NONCE_SIZE],
        cleartext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_SIZE]), CryptoError> {
        let mut buffer = cleartext.to_vec();
        let nonce = Nonce::from_slice(nonce);

        let tag = match self {
            Self::Aes128(cipher) => cipher.encrypt_in_place_detached(nonce, &[], &mut buffer),
            Self::Aes256(cipher) => cipher.encrypt_in_place_detached(nonce, &[], &mut buffer),
        }
        .map_err(|_| CryptoError::Aead)?;

        Ok((buffer, tag.into()))
    }

    /// Open `ciphertext` against the detached tag, returning the cleartext.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut buffer = ciphertext.to_vec();
        let nonce = Nonce::from_slice(nonce);
        let tag = Tag::from_slice(tag);

        match self {
            Self::Aes128(cipher) => {
                cipher.decrypt_in_place_detached(nonce, &[], &mut buffer, tag)
            }
            Self::Aes256(cipher) => {
                cipher.decrypt_in_place_detached(nonce, &[], &mut buffer, tag)
            }
        }
        .map_err(|_| CryptoError::Aead)?;

        Ok(buffer)
    }

    /// The key size of this cipher in bytes.
    #[must_use]
    pub fn key_size(&self) -> usize {
        match self {
            Self::Aes128(_) => 16,
            Self::Aes256(_) => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip_aes128() {
        let cipher = AeadCipher::new(&[0x11; 16]).unwrap();
        let nonce = [0x22; NONCE_SIZE];

        let (ciphertext, tag) = cipher.seal(&nonce, b"some cleartext").unwrap();
        assert_ne!(&ciphertext[..], b"some cleartext");

        let cleartext = cipher.open(&nonce, &ciphertext, &tag).unwrap();
        assert_eq!(cleartext, b"some cleartext");
    }

    #[test]
    fn test_seal_open_round_trip_aes256() {
        let cipher = AeadCipher::new(&[0x33; 32]).unwrap();
        let nonce = [0x44; NONCE_SIZE];

        let (ciphertext, tag) = cipher.seal(&nonce, b"other cleartext").unwrap();
        let cleartext = cipher.open(&nonce, &ciphertext, &tag).unwrap();

        assert_eq!(cleartext, b"other cleartext");
    }

    #[test]
    fn test_empty_cleartext_is_valid() {
        let cipher = AeadCipher::new(&[0x55; 16]).unwrap();
        let nonce = [0x66; NONCE_SIZE];

        let (ciphertext, tag) = cipher.seal(&nonce, &[]).unwrap();
        assert!(ciphertext.is_empty());

        let cleartext = cipher.open(&nonce, &ciphertext, &tag).unwrap();
        assert!(cleartext.is_empty());
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let cipher = AeadCipher::new(&[0x77; 16]).unwrap();
        let nonce = [0x88; NONCE_SIZE];

        let (mut ciphertext, tag) = cipher.seal(&nonce, b"payload").unwrap();
        ciphertext[0] ^= 0x01;

        assert!(matches!(
            cipher.open(&nonce, &ciphertext, &tag),
            Err(CryptoError::Aead)
        ));
    }

    #[test]
    fn test_tampered_tag_is_rejected() {
        let cipher = AeadCipher::new(&[0x99; 16]).unwrap();
        let nonce = [0xaa; NONCE_SIZE];

        let (ciphertext, mut tag) = cipher.seal(&nonce, b"payload").unwrap();
        tag[0] ^= 0x01;

        assert!(cipher.open(&nonce, &ciphertext, &tag).is_err());
    }

    #[test]
    fn test_wrong_nonce_is_rejected() {
        let cipher = AeadCipher::new(&[0xbb; 32]).unwrap();

        let (ciphertext, tag) = cipher.seal(&[0x01; NONCE_SIZE], b"payload").unwrap();

        assert!(cipher.open(&[0x02; NONCE_SIZE], &ciphertext, &tag).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            AeadCipher::new(&[0u8; 24]),
            Err(CryptoError::InvalidKeyLength(24))
        ));
    }
}
