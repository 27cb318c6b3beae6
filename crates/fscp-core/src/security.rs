//! Client security profiles.
//!
//! A [`ClientSecurity`] carries the long-term credentials of an endpoint:
//! either an X.509 certificate with its RSA private key, or a preshared
//! key, plus the cipher suite and elliptic curve preference lists. Each
//! connection takes an immutable snapshot of the profile at creation.

use crate::error::SecurityError;
use fscp_crypto::{cert, psk, sign, Certificate, CipherSuite, EllipticCurve, RsaPrivateKey};
use std::fmt;
use zeroize::Zeroizing;

/// The default cipher suites, in preference order.
pub const DEFAULT_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
];

/// The default elliptic curves, in preference order.
pub const DEFAULT_ELLIPTIC_CURVES: &[EllipticCurve] =
    &[EllipticCurve::SECP384R1, EllipticCurve::SECP521R1];

/// Return the first element of `local` that also appears in `remote`.
///
/// The local preference order wins: this is deliberately not commutative.
#[must_use]
pub fn find_common<T: PartialEq + Copy>(local: &[T], remote: &[T]) -> Option<T> {
    local.iter().copied().find(|value| remote.contains(value))
}

/// The security settings of a client.
#[derive(Clone, Default)]
pub struct ClientSecurity {
    /// The local X.509 certificate, if any.
    pub certificate: Option<Certificate>,
    /// The RSA private key matching [`Self::certificate`].
    pub private_key: Option<RsaPrivateKey>,
    /// The preshared key, if operating in preshared-key mode.
    pub preshared_key: Option<Zeroizing<Vec<u8>>>,
    /// Supported cipher suites in preference order. `None` means the
    /// defaults.
    pub cipher_suites: Option<Vec<CipherSuite>>,
    /// Supported elliptic curves in preference order. `None` means the
    /// defaults.
    pub elliptic_curves: Option<Vec<EllipticCurve>>,
}

impl ClientSecurity {
    /// Derive and install a preshared key from a passphrase.
    pub fn set_preshared_key_from_passphrase(
        &mut self,
        passphrase: &str,
        salt: &[u8],
        iterations: u32,
    ) {
        self.preshared_key = Some(psk::derive_preshared_key(passphrase, salt, iterations));
    }

    /// Validate the profile, filling in a temporary certificate when no
    /// credentials are configured at all.
    ///
    /// Fails fast on a certificate without its private key or on empty
    /// preference lists.
    pub fn validate(&mut self) -> Result<(), SecurityError> {
        if self.certificate.is_some() {
            if self.private_key.is_none() {
                return Err(SecurityError::MissingPrivateKey);
            }
        } else if self.preshared_key.is_none() {
            let (private_key, certificate) = cert::generate_self_signed()?;
            self.private_key = Some(private_key);
            self.certificate = Some(certificate);
        }

        if self.supported_cipher_suites().is_empty() {
            return Err(SecurityError::NoCipherSuites);
        }

        if self.supported_elliptic_curves().is_empty() {
            return Err(SecurityError::NoEllipticCurves);
        }

        Ok(())
    }

    /// The effective cipher suite preference list.
    #[must_use]
    pub fn supported_cipher_suites(&self) -> &[CipherSuite] {
        self.cipher_suites.as_deref().unwrap_or(DEFAULT_CIPHER_SUITES)
    }

    /// The effective elliptic curve preference list.
    #[must_use]
    pub fn supported_elliptic_curves(&self) -> &[EllipticCurve] {
        self.elliptic_curves
            .as_deref()
            .unwrap_or(DEFAULT_ELLIPTIC_CURVES)
    }

    /// Sign a handshake payload with the configured credentials.
    pub fn sign(&self, cleartext: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if let Some(private_key) = &self.private_key {
            return Ok(sign::sign_pss(private_key, cleartext)?);
        }

        if let Some(preshared_key) = &self.preshared_key {
            return Ok(sign::sign_hmac(preshared_key, cleartext));
        }

        Err(SecurityError::MissingCredentials)
    }

    /// Verify a peer's handshake signature against its known credentials.
    pub fn verify(
        &self,
        remote: &RemoteSecurity,
        cleartext: &[u8],
        signature: &[u8],
    ) -> Result<(), SecurityError> {
        if let Some(certificate) = &remote.certificate {
            return Ok(sign::verify_pss(
                certificate.public_key(),
                cleartext,
                signature,
            )?);
        }

        if let Some(preshared_key) = &self.preshared_key {
            return Ok(sign::verify_hmac(preshared_key, cleartext, signature)?);
        }

        Err(SecurityError::MissingRemoteCredentials)
    }
}

impl fmt::Debug for ClientSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of the logs.
        f.debug_struct("ClientSecurity")
            .field("certificate", &self.certificate)
            .field("has_private_key", &self.private_key.is_some())
            .field("has_preshared_key", &self.preshared_key.is_some())
            .field("cipher_suites", &self.supported_cipher_suites())
            .field("elliptic_curves", &self.supported_elliptic_curves())
            .finish()
    }
}

/// The credentials learned about a remote client.
///
/// An absent certificate means the peer presented itself in preshared-key
/// mode.
#[derive(Debug, Clone, Default)]
pub struct RemoteSecurity {
    /// The peer's certificate, delivered in its PRESENTATION message.
    pub certificate: Option<Certificate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_common_is_not_commutative() {
        let a = [
            CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
            CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
        ];
        let b = [
            CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
            CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
        ];

        assert_eq!(
            find_common(&a, &b),
            Some(CipherSuite::ECDHE_RSA_AES128_GCM_SHA256)
        );
        assert_eq!(
            find_common(&b, &a),
            Some(CipherSuite::ECDHE_RSA_AES256_GCM_SHA384)
        );
    }

    #[test]
    fn test_find_common_without_overlap() {
        let a = [
            CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
            CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
        ];
        let c = [CipherSuite(0xff)];

        assert_eq!(find_common(&a, &c), None);
        assert_eq!(find_common(&a, &[]), None);
        assert_eq!(find_common::<CipherSuite>(&[], &a), None);
    }

    #[test]
    fn test_find_common_curves_both_directions() {
        let a = [EllipticCurve::SECT571K1, EllipticCurve::SECP384R1];
        let b = [EllipticCurve::SECP384R1, EllipticCurve::SECT571K1];
        let c = [EllipticCurve::SECP521R1];

        assert_eq!(find_common(&a, &b), Some(EllipticCurve::SECT571K1));
        assert_eq!(find_common(&b, &a), Some(EllipticCurve::SECP384R1));
        assert_eq!(find_common(&a, &c), None);
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let security = ClientSecurity::default();

        assert_eq!(security.supported_cipher_suites(), DEFAULT_CIPHER_SUITES);
        assert_eq!(security.supported_elliptic_curves(), DEFAULT_ELLIPTIC_CURVES);
    }

    #[test]
    fn test_validate_rejects_empty_lists() {
        let mut security = ClientSecurity {
            cipher_suites: Some(vec![]),
            ..Default::default()
        };
        security.set_preshared_key_from_passphrase("x", b"salt", 1);

        assert!(matches!(
            security.validate(),
            Err(SecurityError::NoCipherSuites)
        ));

        let mut security = ClientSecurity {
            elliptic_curves: Some(vec![]),
            ..Default::default()
        };
        security.set_preshared_key_from_passphrase("x", b"salt", 1);

        assert!(matches!(
            security.validate(),
            Err(SecurityError::NoEllipticCurves)
        ));
    }

    #[test]
    fn test_validate_generates_temporary_certificate() {
        let mut security = ClientSecurity::default();
        security.validate().unwrap();

        assert!(security.certificate.is_some());
        assert!(security.private_key.is_some());
    }

    #[test]
    fn test_preshared_key_mode_skips_certificate_generation() {
        let mut security = ClientSecurity::default();
        security.set_preshared_key_from_passphrase(
            "passphrase",
            psk::DEFAULT_PRESHARED_KEY_SALT,
            psk::DEFAULT_PRESHARED_KEY_ITERATIONS,
        );
        security.validate().unwrap();

        assert!(security.certificate.is_none());
        assert!(security.private_key.is_none());
    }

    #[test]
    fn test_hmac_sign_verify_round_trip() {
        let mut security = ClientSecurity::default();
        security.set_preshared_key_from_passphrase("passphrase", b"salt", 10);

        let signature = security.sign(b"handshake").unwrap();
        security
            .verify(&RemoteSecurity::default(), b"handshake", &signature)
            .unwrap();

        assert!(security
            .verify(&RemoteSecurity::default(), b"tampered", &signature)
            .is_err());
    }

    #[test]
    fn test_certificate_sign_verify_round_trip() {
        let mut alice = ClientSecurity::default();
        alice.validate().unwrap();

        let bob_view = RemoteSecurity {
            certificate: alice.certificate.clone(),
        };

        let signature = alice.sign(b"handshake").unwrap();
        let verifier = ClientSecurity::default();
        verifier.verify(&bob_view, b"handshake", &signature).unwrap();
        assert!(verifier.verify(&bob_view, b"tampered", &signature).is_err());
    }

    #[test]
    fn test_verify_without_credentials_fails() {
        let security = ClientSecurity::default();

        assert!(matches!(
            security.verify(&RemoteSecurity::default(), b"data", b"sig"),
            Err(SecurityError::MissingRemoteCredentials)
        ));
    }

    #[test]
    fn test_certificate_without_key_is_rejected() {
        let mut with_cert = ClientSecurity::default();
        with_cert.validate().unwrap();

        let mut broken = ClientSecurity {
            certificate: with_cert.certificate,
            ..Default::default()
        };

        assert!(matches!(
            broken.validate(),
            Err(SecurityError::MissingPrivateKey)
        ));
    }
}
