//! AEAD envelope for session payloads.
//!
//! Sealed layout: `nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//! The nonce is drawn fresh from OS entropy for every payload; the
//! XChaCha20 extended nonce is large enough that random generation is
//! safe for the lifetime of a session.

use chacha20poly1305::{XChaCha20Poly1305, XNonce, aead::Aead};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::SessionError;

/// Nonce prefix length (XChaCha20 extended nonce).
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag length.
pub const TAG_SIZE: usize = 16;

/// Seal a plaintext under the session cipher.
pub(crate) fn seal(
    cipher: &XChaCha20Poly1305,
    plaintext: &[u8],
) -> Result<Vec<u8>, SessionError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| SessionError::Integrity)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed payload under the session cipher.
///
/// # Errors
///
/// Returns [`SessionError::Truncated`] if the input cannot contain a
/// nonce and tag, and [`SessionError::Integrity`] if authentication
/// fails (tampering, or a key from an unrelated session).
pub(crate) fn open(
    cipher: &XChaCha20Poly1305,
    sealed: &[u8],
) -> Result<Vec<u8>, SessionError> {
    let min = NONCE_SIZE + TAG_SIZE;
    if sealed.len() < min {
        return Err(SessionError::Truncated { len: sealed.len(), min });
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| SessionError::Integrity)
}
