//! Cryptographic session primitives for the Tether session layer.
//!
//! Establishes a per-session symmetric encryption context from an
//! asymmetric key exchange. Each peer generates an X25519 keypair at
//! session construction, exports its public key under a capability
//! token, and derives the shared session key (HKDF-SHA256 over the
//! Diffie-Hellman secret) once it learns the remote public key.
//! Payloads are sealed with XChaCha20-Poly1305.
//!
//! This crate knows nothing about connections or transports. The
//! session layer composes it through an encryption decorator; the
//! ordering rule "handshake before activation" is enforced there, not
//! here.
//!
//! # Security
//!
//! Forward secrecy is scoped to the session: the keypair lives exactly
//! as long as the owning session object. AEAD sealing authenticates
//! every payload, so ciphertext produced under an unrelated session
//! key is rejected rather than decrypted into garbage.

pub mod derivation;
pub mod error;
pub mod seal;
pub mod session;

pub use derivation::{SESSION_KEY_SIZE, derive_session_key};
pub use error::SessionError;
pub use seal::{NONCE_SIZE, TAG_SIZE};
pub use session::{CapabilityToken, CryptoSession};
pub use x25519_dalek::PublicKey;
