//! The TLS 1.2 pseudo-random function used for session key derivation.
//!
//! `p_hash` is defined in RFC 4346, section 5; the labeled PRF on top of it
//! in RFC 5246, section 5. FSCP instantiates the PRF with SHA-256 and the
//! labels below, seeded with the host identifiers of the two peers.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Derivation label for the per-direction session keys.
pub const SESSION_KEY_LABEL: &[u8] = b"session key";

/// Derivation label for the per-direction IV prefixes.
pub const NONCE_PREFIX_LABEL: &[u8] = b"nonce prefix";

fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");

    for part in parts {
        mac.update(part);
    }

    mac.finalize().into_bytes().into()
}

/// The `P_hash` expansion function (RFC 4346, section 5).
///
/// Fills `result` entirely, iterating `A(i) = HMAC(secret, A(i-1))` and
/// emitting `HMAC(secret, A(i) || seed)` blocks.
pub fn p_hash(result: &mut [u8], secret: &[u8], seed: &[u8]) {
    let mut a = hmac_sha256(secret, &[seed]);
    let mut offset = 0;

    while offset < result.len() {
        let block = hmac_sha256(secret, &[&a, seed]);
        let n = (result.len() - offset).min(block.len());
        result[offset..offset + n].copy_from_slice(&block[..n]);
        offset += n;

        a = hmac_sha256(secret, &[&a]);
    }
}

/// The TLS 1.2 PRF (RFC 5246, section 5): `P_hash(secret, label || seed)`.
pub fn prf(result: &mut [u8], secret: &[u8], label: &[u8], seed: &[u8]) {
    let mut label_and_seed = Vec::with_capacity(label.len() + seed.len());
    label_and_seed.extend_from_slice(label);
    label_and_seed.extend_from_slice(seed);

    p_hash(result, secret, &label_and_seed);
}

#[cfg(test)]
mod tests {
    use super::*;

    // The widely published TLS 1.2 PRF SHA-256 test vector.
    #[test]
    fn test_prf_sha256_vector() {
        let secret = [
            0x9b, 0xbe, 0x43, 0x6b, 0xa9, 0x40, 0xf0, 0x17, 0xb1, 0x76, 0x52, 0x84, 0x9a, 0x71,
            0xdb, 0x35,
        ];
        let seed = [
            0xa0, 0xba, 0x9f, 0x93, 0x6c, 0xda, 0x31, 0x18, 0x27, 0xa6, 0xf7, 0x96, 0xff, 0xd5,
            0x19, 0x8c,
        ];
        let expected = [
            0xe3, 0xf2, 0x29, 0xba, 0x72, 0x7b, 0xe1, 0x7b, 0x8d, 0x12, 0x26, 0x20, 0x55, 0x7c,
            0xd4, 0x53, 0xc2, 0xaa, 0xb2, 0x1d, 0x07, 0xc3, 0xd4, 0x95, 0x32, 0x9b, 0x52, 0xd4,
            0xe6, 0x1e, 0xdb, 0x5a, 0x6b, 0x30, 0x17, 0x91, 0xe9, 0x0d, 0x35, 0xc9, 0xc9, 0xa4,
            0x6b, 0x4e, 0x14, 0xba, 0xf9, 0xaf, 0x0f, 0xa0, 0x22, 0xf7, 0x07, 0x7d, 0xef, 0x17,
            0xab, 0xfd, 0x37, 0x97, 0xc0, 0x56, 0x4b, 0xab, 0x4f, 0xbc, 0x91, 0x66, 0x6e, 0x9d,
            0xef, 0x9b, 0x97, 0xfc, 0xe3, 0x4f, 0x79, 0x67, 0x89, 0xba, 0xa4, 0x80, 0x82, 0xd1,
            0x22, 0xee, 0x42, 0xc5, 0xa7, 0x2e, 0x5a, 0x51, 0x10, 0xff, 0xf7, 0x01, 0x87, 0x34,
            0x7b, 0x66,
        ];

        let mut output = [0u8; 100];
        prf(&mut output, &secret, b"test label", &seed);

        assert_eq!(output[..], expected[..]);
    }

    #[test]
    fn test_prf_is_deterministic() {
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];

        prf(&mut a, b"secret", SESSION_KEY_LABEL, b"seed");
        prf(&mut b, b"secret", SESSION_KEY_LABEL, b"seed");

        assert_eq!(a, b);
    }

    #[test]
    fn test_prf_separates_labels() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];

        prf(&mut a, b"secret", SESSION_KEY_LABEL, b"seed");
        prf(&mut b, b"secret", NONCE_PREFIX_LABEL, b"seed");

        assert_ne!(a, b);
    }

    #[test]
    fn test_prf_separates_seeds() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];

        prf(&mut a, b"secret", SESSION_KEY_LABEL, b"alice");
        prf(&mut b, b"secret", SESSION_KEY_LABEL, b"bob");

        assert_ne!(a, b);
    }

    #[test]
    fn test_p_hash_fills_odd_lengths() {
        // Lengths that are not a multiple of the SHA-256 output size still
        // fill the whole buffer.
        for len in [1usize, 31, 33, 100] {
            let mut out = vec![0u8; len];
            p_hash(&mut out, b"secret", b"seed");
            assert!(out.iter().any(|&b| b != 0), "length {len} left zeroes");
        }
    }
}
