//! Test harness for the Tether session layer.
//!
//! Provides the transports the integration tests run on:
//!
//! - [`memory::MemoryTransport`]: a paired in-memory channel transport,
//!   the stand-in for a real socket. `pair_chunked` splits outbound
//!   payloads into fixed-size chunks to exercise stream reassembly.
//! - [`probe::ProbeTransport`]: records every hook invocation and can
//!   be told to fail teardown or report lost connectivity.
//! - [`probe::ShearTransport`]: writes each message in two phases with
//!   a yield in between, so broken send serialization shows up as
//!   interleaved halves in its log.
//!
//! Timing-sensitive tests (keep-alive) run on Tokio's paused clock;
//! nothing in this crate touches a real network or the wall clock.

pub mod memory;
pub mod probe;

pub use memory::MemoryTransport;
pub use probe::{EventLog, ProbeCalls, ProbeTransport, ShearTransport, WritePhase};
