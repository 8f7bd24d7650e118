//! # State Table Messages
//!
//! Requests sent from a [`StateClient`](super::StateClient) to the
//! [`StateTable`](super::StateTable), each carrying a one-shot channel for
//! the answer.

use super::error::StateError;
use crate::model::ServiceState;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the table.
pub type Response<T> = oneshot::Sender<Result<T, StateError>>;

/// Everything the state table can be asked to do.
///
/// Registration and transitions are the only writes. A service task is the
/// single writer of its own entry; everyone else only reads.
#[derive(Debug)]
pub enum StateRequest {
    /// Adds a service in `Pending`.
    Register {
        service: String,
        respond_to: Response<()>,
    },
    /// Moves a service to a new state; answers with the previous one.
    Transition {
        service: String,
        to: ServiceState,
        respond_to: Response<ServiceState>,
    },
    Get {
        service: String,
        respond_to: Response<ServiceState>,
    },
    /// Every entry, in registration order.
    Snapshot {
        respond_to: Response<Vec<(String, ServiceState)>>,
    },
}
