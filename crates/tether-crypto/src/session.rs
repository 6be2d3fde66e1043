//! Asymmetric handshake producing the session encryption context.
//!
//! A [`CryptoSession`] is created with a fresh X25519 keypair and a
//! random capability token. The handshake is two observable steps:
//!
//! 1. each peer exports its public key (gated by the capability token)
//!    and conveys it to the other side by whatever means the composing
//!    layer provides;
//! 2. each peer calls [`CryptoSession::start_session`] with the remote
//!    public key, deriving the shared XChaCha20-Poly1305 context.
//!
//! `start_session` is one-shot per session. Sealing before it
//! completes, or starting twice, is a state error, not a crypto
//! failure.

use std::fmt;

use chacha20poly1305::{KeyInit, XChaCha20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::derivation::derive_session_key;
use crate::error::SessionError;
use crate::seal;

/// Opaque token authorizing public-key export from the owning session.
///
/// Guards against exporting a key through the wrong session object
/// when several sessions coexist; it is an accident guard scoped to
/// the process, not a network-facing credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CapabilityToken([u8; 32]);

impl CapabilityToken {
    fn generate() -> Self {
        let mut token = [0u8; 32];
        OsRng.fill_bytes(&mut token);
        Self(token)
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token bytes stay out of logs.
        f.write_str("CapabilityToken(..)")
    }
}

/// Per-peer crypto session: local keypair, capability token, and the
/// derived encryption context once the handshake completed.
///
/// Destroyed together with its owning connection; key material is
/// never reused across sessions.
pub struct CryptoSession {
    secret: StaticSecret,
    public: PublicKey,
    capability: CapabilityToken,
    cipher: Option<XChaCha20Poly1305>,
}

impl CryptoSession {
    /// Generate a session with a fresh keypair and capability token.
    #[must_use]
    pub fn new() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public, capability: CapabilityToken::generate(), cipher: None }
    }

    /// The token that authorizes exporting this session's public key.
    #[must_use]
    pub fn capability(&self) -> CapabilityToken {
        self.capability.clone()
    }

    /// Export the local public key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unauthorized`] unless `token` is the
    /// capability token issued by this session.
    pub fn public_key(&self, token: &CapabilityToken) -> Result<PublicKey, SessionError> {
        if *token == self.capability { Ok(self.public) } else { Err(SessionError::Unauthorized) }
    }

    /// Whether the handshake completed and payloads can be sealed.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.cipher.is_some()
    }

    /// Derive the session encryption context from the remote public
    /// key. One-shot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyEstablished`] on a second call.
    pub fn start_session(&mut self, remote: &PublicKey) -> Result<(), SessionError> {
        if self.cipher.is_some() {
            return Err(SessionError::AlreadyEstablished);
        }

        let shared = self.secret.diffie_hellman(remote);
        let key = derive_session_key(shared.as_bytes());
        self.cipher = Some(XChaCha20Poly1305::new(&key.into()));
        Ok(())
    }

    /// Seal a plaintext payload under the session context.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotEstablished`] before `start_session`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        let cipher = self.cipher.as_ref().ok_or(SessionError::NotEstablished)?;
        seal::seal(cipher, plaintext)
    }

    /// Open a sealed payload under the session context.
    ///
    /// `open(seal(x)) == x` within one established session; payloads
    /// sealed by an unrelated session fail with
    /// [`SessionError::Integrity`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotEstablished`] before `start_session`,
    /// [`SessionError::Truncated`] or [`SessionError::Integrity`] for
    /// rejected input.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SessionError> {
        let cipher = self.cipher.as_ref().ok_or(SessionError::NotEstablished)?;
        seal::open(cipher, sealed)
    }
}

impl Default for CryptoSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CryptoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoSession")
            .field("established", &self.is_established())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Two sessions that completed the handshake with each other.
    fn established_pair() -> (CryptoSession, CryptoSession) {
        let mut alice = CryptoSession::new();
        let mut bob = CryptoSession::new();

        let alice_public = alice.public_key(&alice.capability()).unwrap();
        let bob_public = bob.public_key(&bob.capability()).unwrap();

        alice.start_session(&bob_public).unwrap();
        bob.start_session(&alice_public).unwrap();

        (alice, bob)
    }

    #[test]
    fn export_requires_matching_capability() {
        let session = CryptoSession::new();
        let stranger = CryptoSession::new();

        assert!(session.public_key(&session.capability()).is_ok());
        assert_eq!(
            session.public_key(&stranger.capability()),
            Err(SessionError::Unauthorized)
        );
    }

    #[test]
    fn seal_before_handshake_is_a_state_error() {
        let session = CryptoSession::new();
        assert_eq!(session.seal(b"x"), Err(SessionError::NotEstablished));
        assert_eq!(session.open(b"x"), Err(SessionError::NotEstablished));
    }

    #[test]
    fn start_session_is_one_shot() {
        let (mut alice, bob) = established_pair();
        let bob_public = bob.public_key(&bob.capability()).unwrap();
        assert_eq!(alice.start_session(&bob_public), Err(SessionError::AlreadyEstablished));
    }

    #[test]
    fn peers_of_one_handshake_interoperate() {
        let (alice, bob) = established_pair();

        let sealed = alice.seal(b"hello").unwrap();
        assert_eq!(bob.open(&sealed).unwrap(), b"hello");

        let sealed = bob.seal(b"hello back").unwrap();
        assert_eq!(alice.open(&sealed).unwrap(), b"hello back");
    }

    #[test]
    fn cross_session_ciphertext_is_rejected() {
        let (alice, _bob) = established_pair();
        let (carol, _dave) = established_pair();

        let sealed = alice.seal(b"for bob only").unwrap();
        assert_eq!(carol.open(&sealed), Err(SessionError::Integrity));
    }

    proptest! {
        #[test]
        fn open_inverts_seal_for_all_payloads(
            payload in proptest::collection::vec(any::<u8>(), 0..4096)
        ) {
            let (alice, bob) = established_pair();
            let sealed = alice.seal(&payload).unwrap();
            prop_assert_eq!(bob.open(&sealed).unwrap(), payload);
        }
    }
}
