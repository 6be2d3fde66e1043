//! Decorator composition.
//!
//! A decorator exclusively owns the link it wraps, applies its own
//! transformation on the outbound path, the inverse on the inbound
//! path, and delegates lifecycle calls inward. Wrapping order is
//! transformation order: the outermost decorator is the last transform
//! applied outbound and the first applied inbound, and composition is
//! associative.
//!
//! Wrap-time preconditions are checked in the constructor, before any
//! transformation logic exists: the inner link must be connected and
//! must not have been activated yet. Handing a decorator an already
//! live link is a construction contract failure, not a runtime race.

mod framed;
mod sealed;

pub use framed::{DEFAULT_MAX_FRAME, FramedLink};
pub use sealed::SealedLink;

use crate::error::LinkError;
use crate::link::Link;
use crate::state::ConnectionState;

/// Verify the wrap-time preconditions shared by every decorator.
pub(crate) fn check_wrappable<S, R>(inner: &dyn Link<S, R>) -> Result<(), LinkError> {
    let state = inner.state();
    if state != ConnectionState::Initialized {
        return Err(LinkError::Construction {
            reason: format!("inner link is {state:?}, must be initialized and not yet activated"),
        });
    }
    if !inner.is_connected() {
        return Err(LinkError::Construction {
            reason: "inner link reports no transport-level connectivity".to_string(),
        });
    }
    Ok(())
}
