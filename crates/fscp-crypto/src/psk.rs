//! Preshared-key derivation from a passphrase.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256. The defaults (empty
//! passphrase, `"freelan"` salt, 2000 iterations, 32-byte output) match the
//! legacy implementation so that passphrase-configured peers interoperate.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// The default preshared-key passphrase.
pub const DEFAULT_PRESHARED_KEY_PASSPHRASE: &str = "";

/// The default preshared-key salt.
pub const DEFAULT_PRESHARED_KEY_SALT: &[u8] = b"freelan";

/// The default preshared-key iteration count.
pub const DEFAULT_PRESHARED_KEY_ITERATIONS: u32 = 2000;

/// The size of a derived preshared key.
pub const PRESHARED_KEY_SIZE: usize = 32;

/// Derive a preshared key from a passphrase.
#[must_use]
pub fn derive_preshared_key(
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; PRESHARED_KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);

    key
}
