//! Tether session layer core.
//!
//! A transport-agnostic duplex connection abstraction: message- or
//! stream-oriented peers get a uniform lifecycle (construct →
//! activate → exchange → disconnect/dispose), composable through
//! decorators, independent of the socket technology underneath.
//!
//! # Architecture
//!
//! One concrete state machine, composition at a trait seam. The
//! [`endpoint::Endpoint`] binds a [`transport::Transport`] (the hook
//! set a concrete byte pump implements) to the [`link::Link`] contract
//! (the only interface the application and the decorators ever see).
//! Decorators own the link they wrap and re-implement `Link`, so
//! capabilities stack without the inner transport knowing about the
//! outer layers:
//!
//! ```text
//! application
//!     │ plaintext frames
//! SealedLink        (seal / open)
//!     │ ciphertext frames
//! FramedLink        (length-prefix / reassemble)
//!     │ byte chunks
//! Endpoint ── Transport (TCP, UDP, in-memory pair, ...)
//! ```
//!
//! # Components
//!
//! - [`state`]: lifecycle states, legal-transition table, state cell
//! - [`link`]: the `Link` contract
//! - [`endpoint`]: the concrete state machine over a transport
//! - [`decorator`]: composition contract, sealing and framing layers
//! - [`keepalive`]: heartbeat sender and loss-detection checker
//! - [`event`]: subscriber lists and lifecycle notifications
//! - [`transport`]: the hook set concrete transports implement
//! - [`error`]: error taxonomy

pub mod decorator;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod keepalive;
pub mod link;
pub mod state;
pub mod transport;

mod lifecycle;

pub use decorator::{DEFAULT_MAX_FRAME, FramedLink, SealedLink};
pub use endpoint::Endpoint;
pub use error::LinkError;
pub use event::{DisconnectReason, EventSubscriber, LinkEvent, MessageSubscriber};
pub use keepalive::{KeepAlive, KeepAliveConfig};
pub use link::Link;
pub use state::ConnectionState;
pub use transport::{Inbound, Transport};
