//! Per-session cryptographic state.
//!
//! A session is created with a fresh ECDHE keypair on the negotiated curve.
//! Once the peer's public key arrives in a SESSION message, `set_remote`
//! derives the per-direction keys and IV prefixes from the shared secret and
//! the two host identifiers, after which the session encrypts and decrypts
//! DATA messages. The shared secret itself is dropped (and zeroized) before
//! `set_remote` returns.
//!
//! Anti-replay is strict monotone advance: a received sequence number must
//! exceed the last accepted one, with no reordering window.

use crate::error::SessionError;
use crate::message::{DataMessage, HostIdentifier, GCM_TAG_SIZE};
use fscp_crypto::prf::{prf, NONCE_PREFIX_LABEL, SESSION_KEY_LABEL};
use fscp_crypto::{AeadCipher, CipherSuite, EcdheKeyPair, EllipticCurve};
use fscp_crypto::{IV_PREFIX_SIZE, NONCE_SIZE};
use zeroize::Zeroizing;

/// The largest cleartext that still fits a DATA message payload.
pub const MAX_CLEARTEXT_SIZE: usize = u16::MAX as usize - 4 - GCM_TAG_SIZE - 2;

/// An outgoing or incoming session.
pub struct Session {
    session_number: u32,
    cipher_suite: CipherSuite,
    elliptic_curve: EllipticCurve,
    block_size: usize,
    local_host_identifier: HostIdentifier,
    keypair: Option<EcdheKeyPair>,
    public_key_pem: Vec<u8>,
    remote_public_key_pem: Option<Vec<u8>>,
    local_cipher: Option<AeadCipher>,
    remote_cipher: Option<AeadCipher>,
    local_iv_prefix: [u8; IV_PREFIX_SIZE],
    remote_iv_prefix: [u8; IV_PREFIX_SIZE],
    local_sequence: u32,
    last_remote_sequence: u32,
}

impl Session {
    /// Create a session, generating a fresh ECDHE keypair.
    pub fn new(
        local_host_identifier: HostIdentifier,
        session_number: u32,
        cipher_suite: CipherSuite,
        elliptic_curve: EllipticCurve,
    ) -> Result<Self, SessionError> {
        let block_size = cipher_suite
            .block_size()
            .ok_or(SessionError::UnsupportedCipherSuite(cipher_suite))?;

        let keypair = EcdheKeyPair::generate(elliptic_curve)?;
        let public_key_pem = keypair
            .public_key_pem()
            .map_err(SessionError::from)?
            .into_bytes();

        Ok(Self {
            session_number,
            cipher_suite,
            elliptic_curve,
            block_size,
            local_host_identifier,
            keypair: Some(keypair),
            public_key_pem,
            remote_public_key_pem: None,
            local_cipher: None,
            remote_cipher: None,
            local_iv_prefix: [0u8; IV_PREFIX_SIZE],
            remote_iv_prefix: [0u8; IV_PREFIX_SIZE],
            local_sequence: 0,
            last_remote_sequence: 0,
        })
    }

    /// The session number.
    #[must_use]
    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    /// The negotiated cipher suite.
    #[must_use]
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// The negotiated elliptic curve.
    #[must_use]
    pub fn elliptic_curve(&self) -> EllipticCurve {
        self.elliptic_curve
    }

    /// The local PEM-encoded ECDHE public key, as carried in SESSION
    /// messages.
    #[must_use]
    pub fn public_key_pem(&self) -> &[u8] {
        &self.public_key_pem
    }

    /// Whether `set_remote` has completed and the session can move data.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.local_cipher.is_some()
    }

    /// Install the peer's key material and derive the session keys.
    ///
    /// May be called at most once with a given key: a repeat with the exact
    /// same key is a no-op, a repeat with different material fails with
    /// [`SessionError::RemoteAlreadyPinned`].
    pub fn set_remote(
        &mut self,
        remote_host_identifier: HostIdentifier,
        remote_public_key_pem: &[u8],
    ) -> Result<(), SessionError> {
        if let Some(known) = &self.remote_public_key_pem {
            if known == remote_public_key_pem {
                return Ok(());
            }

            return Err(SessionError::RemoteAlreadyPinned);
        }

        let pem = std::str::from_utf8(remote_public_key_pem)
            .map_err(|e| SessionError::InvalidRemoteKey(e.to_string()))?;

        let keypair = self.keypair.as_ref().ok_or(SessionError::NotReady)?;
        let shared_secret = keypair.agree(pem)?;

        let mut local_key = Zeroizing::new(vec![0u8; self.block_size]);
        let mut remote_key = Zeroizing::new(vec![0u8; self.block_size]);

        prf(
            &mut local_key,
            &shared_secret,
            SESSION_KEY_LABEL,
            self.local_host_identifier.as_bytes(),
        );
        prf(
            &mut remote_key,
            &shared_secret,
            SESSION_KEY_LABEL,
            remote_host_identifier.as_bytes(),
        );
        prf(
            &mut self.local_iv_prefix,
            &shared_secret,
            NONCE_PREFIX_LABEL,
            self.local_host_identifier.as_bytes(),
        );
        prf(
            &mut self.remote_iv_prefix,
            &shared_secret,
            NONCE_PREFIX_LABEL,
            remote_host_identifier.as_bytes(),
        );

        // The shared secret must not outlive derivation.
        drop(shared_secret);

        self.local_cipher = Some(AeadCipher::new(&local_key)?);
        self.remote_cipher = Some(AeadCipher::new(&remote_key)?);
        self.remote_public_key_pem = Some(remote_public_key_pem.to_vec());

        // The ECDHE private key has served its purpose.
        self.keypair = None;

        Ok(())
    }

    /// Encrypt one cleartext into a DATA message on `channel`.
    ///
    /// Not safe for concurrent callers: the local sequence number advances
    /// with every call.
    pub fn encrypt(&mut self, channel: u8, cleartext: &[u8]) -> Result<DataMessage, SessionError> {
        let cipher = self.local_cipher.as_ref().ok_or(SessionError::NotReady)?;

        if cleartext.len() > MAX_CLEARTEXT_SIZE {
            return Err(SessionError::PayloadTooLarge(cleartext.len()));
        }

        let sequence_number = self.local_sequence.wrapping_add(1);
        let nonce = compose_nonce(&self.local_iv_prefix, sequence_number);

        let (ciphertext, tag) = cipher
            .seal(&nonce, cleartext)
            .map_err(|_| SessionError::AeadAuthFailure)?;

        self.local_sequence = sequence_number;

        Ok(DataMessage {
            channel,
            sequence_number,
            tag,
            ciphertext,
        })
    }

    /// Decrypt one DATA message.
    ///
    /// Enforces strictly increasing sequence numbers; the last accepted
    /// sequence number only advances when authentication succeeds.
    pub fn decrypt(&mut self, message: &DataMessage) -> Result<Vec<u8>, SessionError> {
        let cipher = self.remote_cipher.as_ref().ok_or(SessionError::NotReady)?;

        if message.sequence_number <= self.last_remote_sequence {
            return Err(SessionError::OutdatedSequence {
                got: message.sequence_number,
                last: self.last_remote_sequence,
            });
        }

        let nonce = compose_nonce(&self.remote_iv_prefix, message.sequence_number);
        let cleartext = cipher
            .open(&nonce, &message.ciphertext, &message.tag)
            .map_err(|_| SessionError::AeadAuthFailure)?;

        self.last_remote_sequence = message.sequence_number;

        Ok(cleartext)
    }
}

fn compose_nonce(prefix: &[u8; IV_PREFIX_SIZE], sequence_number: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..IV_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[IV_PREFIX_SIZE..].copy_from_slice(&sequence_number.to_be_bytes());

    nonce
}
