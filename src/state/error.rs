//! # State Table Errors
//!
//! Protocol errors between service tasks and the state table actor.

use crate::model::ServiceState;

/// Errors that can occur while talking to the state table.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("State table closed")]
    ActorClosed,
    #[error("State table dropped response channel")]
    ActorDropped,
    #[error("Service not registered: {0}")]
    NotFound(String),
    #[error("Service already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Illegal transition for `{service}`: {from} -> {to}")]
    IllegalTransition {
        service: String,
        from: ServiceState,
        to: ServiceState,
    },
}
