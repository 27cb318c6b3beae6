//! Cipher suite and elliptic curve identifiers.
//!
//! Both types are open sets on the wire: a peer may advertise identifiers we
//! do not know about, and negotiation must carry them through untouched. They
//! are therefore thin wrappers around the raw wire byte rather than closed
//! enums.

use std::fmt;

/// A cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u8);

impl CipherSuite {
    /// The ECDHE-RSA-AES128-GCM-SHA256 cipher suite.
    pub const ECDHE_RSA_AES128_GCM_SHA256: CipherSuite = CipherSuite(0x01);

    /// The ECDHE-RSA-AES256-GCM-SHA384 cipher suite.
    pub const ECDHE_RSA_AES256_GCM_SHA384: CipherSuite = CipherSuite(0x02);

    /// The AES block key size in bytes, or `None` for an unknown suite.
    #[must_use]
    pub fn block_size(self) -> Option<usize> {
        match self {
            Self::ECDHE_RSA_AES128_GCM_SHA256 => Some(16),
            Self::ECDHE_RSA_AES256_GCM_SHA384 => Some(32),
            _ => None,
        }
    }

    /// The raw wire identifier.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for CipherSuite {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ECDHE_RSA_AES128_GCM_SHA256 => f.write_str("ECDHE-RSA-AES128-GCM-SHA256"),
            Self::ECDHE_RSA_AES256_GCM_SHA384 => f.write_str("ECDHE-RSA-AES256-GCM-SHA384"),
            Self(other) => write!(f, "unknown cipher suite (0x{other:02x})"),
        }
    }
}

/// An elliptic curve identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EllipticCurve(pub u8);

impl EllipticCurve {
    /// The SECT571K1 curve. Declared by the protocol but not implementable
    /// here; negotiating it yields an unsupported-curve error.
    pub const SECT571K1: EllipticCurve = EllipticCurve(0x01);

    /// The SECP384R1 (NIST P-384) curve.
    pub const SECP384R1: EllipticCurve = EllipticCurve(0x02);

    /// The SECP521R1 (NIST P-521) curve.
    pub const SECP521R1: EllipticCurve = EllipticCurve(0x03);

    /// The raw wire identifier.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for EllipticCurve {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SECT571K1 => f.write_str("SECT571K1"),
            Self::SECP384R1 => f.write_str("SECP384R1"),
            Self::SECP521R1 => f.write_str("SECP521R1"),
            Self(other) => write!(f, "unknown elliptic curve (0x{other:02x})"),
        }
    }
}
