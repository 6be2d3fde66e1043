//! Error types for the session layer.
//!
//! State-machine violations (`InvalidState`, `Construction`) are
//! programming errors surfaced synchronously and never retried.
//! `Transport` failures propagate to the caller of the failing
//! operation, except inside keep-alive, which converts persistent
//! silence into a forced loss instead of reporting I/O errors.

use std::io;

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors raised by link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Operation attempted from a state that does not allow it.
    #[error("invalid state for {operation}: link is {state:?}, requires {required:?}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The live state at the time of the call.
        state: ConnectionState,
        /// The state the operation requires.
        required: ConnectionState,
    },

    /// Wrap-time or construction-time precondition violated.
    #[error("construction precondition violated: {reason}")]
    Construction {
        /// Which precondition failed.
        reason: String,
    },

    /// Outbound frame exceeds the framing decorator's bound.
    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the rejected frame.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// I/O failure raised by a transport hook.
    #[error("transport failure")]
    Transport(#[from] io::Error),

    /// Crypto session failure surfaced through a sealing decorator.
    #[error(transparent)]
    Session(#[from] tether_crypto::SessionError),
}

impl LinkError {
    /// Shorthand for the most common violation: not `Activated`.
    pub(crate) fn not_activated(operation: &'static str, state: ConnectionState) -> Self {
        Self::InvalidState { operation, state, required: ConnectionState::Activated }
    }

    /// Whether this error is a state-precondition violation (as opposed
    /// to an I/O or crypto failure).
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
