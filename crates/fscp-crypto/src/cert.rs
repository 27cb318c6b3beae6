//! X.509 certificate handling.
//!
//! PRESENTATION messages carry the peer certificate as raw DER. The only
//! thing FSCP extracts from it is the RSA public key used to verify
//! handshake signatures, plus the subject for diagnostics. When a host has
//! neither a certificate nor a preshared key configured, a temporary
//! self-signed RSA-2048 certificate is generated for the process.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls_pki_types::PrivatePkcs8KeyDer;
use std::fmt;
use x509_parser::prelude::*;

/// The RSA modulus size of generated temporary certificates.
pub const GENERATED_KEY_BITS: usize = 2048;

/// A parsed X.509 certificate.
///
/// Holds the raw DER alongside the extracted RSA public key; equality is
/// byte-exact on the DER.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: RsaPublicKey,
    subject: String,
}

impl Certificate {
    /// Parse a certificate from raw DER bytes.
    ///
    /// Fails if the DER is malformed or the subject public key is not RSA.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let (_, parsed) = X509Certificate::from_der(der)
            .map_err(|e| CryptoError::Certificate(e.to_string()))?;

        let public_key = RsaPublicKey::from_public_key_der(parsed.tbs_certificate.subject_pki.raw)
            .map_err(|e| CryptoError::Certificate(format!("not an RSA subject key: {e}")))?;

        Ok(Self {
            der: der.to_vec(),
            public_key,
            subject: parsed.subject().to_string(),
        })
    }

    /// The raw DER encoding, as sent in PRESENTATION messages.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The RSA public key, used to verify handshake signatures.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The certificate subject, for diagnostics.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("der_len", &self.der.len())
            .finish()
    }
}

/// Generate a temporary self-signed certificate for the current host.
///
/// The certificate uses a fresh RSA-2048 key, carries the local hostname as
/// its common name and is valid as a CA for client and server
/// authentication, mirroring what the legacy implementation generates.
pub fn generate_self_signed() -> Result<(RsaPrivateKey, Certificate), CryptoError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, GENERATED_KEY_BITS)
        .map_err(|e| CryptoError::Certificate(format!("generating RSA key: {e}")))?;

    let pkcs8 = private_key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::Certificate(format!("encoding RSA key: {e}")))?;
    let key_pair = rcgen::KeyPair::from_pkcs8_der_and_sign_algo(
        &PrivatePkcs8KeyDer::from(pkcs8.as_bytes()),
        &rcgen::PKCS_RSA_SHA256,
    )
    .map_err(|e| CryptoError::Certificate(format!("loading RSA key: {e}")))?;

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();

    let mut params = rcgen::CertificateParams::new(Vec::<String>::new())
        .map_err(|e| CryptoError::Certificate(e.to_string()))?;
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, hostname);
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![
        rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        rcgen::ExtendedKeyUsagePurpose::ServerAuth,
    ];

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CryptoError::Certificate(e.to_string()))?;

    let der: &[u8] = cert.der();
    let certificate = Certificate::from_der(der)?;

    Ok((private_key, certificate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_parse() {
        let (private_key, certificate) = generate_self_signed().unwrap();

        assert_eq!(certificate.public_key(), &RsaPublicKey::from(&private_key));
        assert!(!certificate.der().is_empty());
        assert!(certificate.subject().starts_with("CN="));
    }

    #[test]
    fn test_der_round_trip() {
        let (_, certificate) = generate_self_signed().unwrap();

        let reparsed = Certificate::from_der(certificate.der()).unwrap();

        assert_eq!(reparsed, certificate);
        assert_eq!(reparsed.subject(), certificate.subject());
    }

    #[test]
    fn test_garbage_der_is_rejected() {
        assert!(matches!(
            Certificate::from_der(b"definitely not DER"),
            Err(CryptoError::Certificate(_))
        ));
    }

    #[test]
    fn test_generated_signature_key_round_trip() {
        use crate::sign::{sign_pss, verify_pss};

        let (private_key, certificate) = generate_self_signed().unwrap();

        let signature = sign_pss(&private_key, b"handshake bytes").unwrap();
        verify_pss(certificate.public_key(), b"handshake bytes", &signature).unwrap();
    }
}
