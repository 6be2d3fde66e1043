//! Session key derivation.
//!
//! The raw X25519 shared secret is never used as an encryption key
//! directly. It is expanded through HKDF-SHA256 with a domain-separated
//! info string, so a Tether session key can never collide with key
//! material another protocol derives from the same exchange.

use hkdf::Hkdf;
use sha2::Sha256;

/// Size of the derived symmetric session key in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// Domain separation for session key expansion.
const SESSION_INFO: &[u8] = b"tether v1 session key";

/// Derive the symmetric session key from an X25519 shared secret.
///
/// Both peers of one handshake derive the same key; unrelated
/// handshakes derive unrelated keys.
#[must_use]
pub fn derive_session_key(shared_secret: &[u8; 32]) -> [u8; SESSION_KEY_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; SESSION_KEY_SIZE];
    hkdf.expand(SESSION_INFO, &mut key)
        .expect("SESSION_KEY_SIZE is within HKDF-SHA256 output bounds");
    key
}
