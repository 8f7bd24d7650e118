use crate::state::StateError;
use thiserror::Error;

/// Failures of the run machinery itself, as opposed to service failures,
/// which end up in the [`RunReport`](super::RunReport).
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("service task panicked: {0}")]
    TaskPanicked(String),
}
