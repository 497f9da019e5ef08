//! Status lifecycles.
//!
//! Each status field in the portal is an enum with an explicit transition table. Handlers and the
//! webhook processor ask the table for the next state and persist it with a compare-and-set on the
//! state they read, so a transition is either applied from the state it was checked against or
//! not at all.
//!
//! - [`request`]: admin triage of client requests
//! - [`project`]: project delivery, payment status and installments
//! - [`invoice`]: invoice issuing
//! - [`payment`]: payment records and gateway transfers

pub mod invoice;
pub mod payment;
pub mod project;
pub mod request;

use thiserror::Error;

/// A lifecycle transition that the table refuses
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The action has no edge out of the current state
    #[error("cannot {action} a {entity} that is '{from}'")]
    NotAllowed {
        entity: &'static str,
        action: &'static str,
        from: String,
    },

    /// The edge exists but its precondition does not hold
    #[error("cannot {action} a {entity}: {reason}")]
    GuardFailed {
        entity: &'static str,
        action: &'static str,
        reason: &'static str,
    },
}
