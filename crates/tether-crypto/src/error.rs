//! Error types for crypto session operations.

use thiserror::Error;

/// Errors raised by [`CryptoSession`](crate::session::CryptoSession)
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `seal`/`open` was called before `start_session` completed.
    #[error("session not established: start_session must complete first")]
    NotEstablished,

    /// `start_session` was called a second time on the same session.
    #[error("session already established: start_session is one-shot")]
    AlreadyEstablished,

    /// Capability token did not match the owning session's token.
    #[error("capability token mismatch: public key export refused")]
    Unauthorized,

    /// Ciphertext failed AEAD authentication.
    ///
    /// Raised for tampered payloads and for ciphertext produced under
    /// an unrelated session key. The two cases are indistinguishable
    /// on purpose.
    #[error("ciphertext rejected: authentication failed")]
    Integrity,

    /// Ciphertext shorter than the nonce-plus-tag envelope minimum.
    #[error("ciphertext too short: {len} bytes, need at least {min}")]
    Truncated {
        /// Length of the rejected input.
        len: usize,
        /// Minimum sealed payload length.
        min: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        assert!(SessionError::Unauthorized.to_string().contains("export refused"));
        assert!(
            SessionError::Truncated { len: 3, min: 40 }.to_string().contains("3 bytes")
        );
    }
}
