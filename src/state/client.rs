//! # State Table Client
//!
//! The cloneable handle service tasks and the controller use to reach the
//! [`StateTable`](super::StateTable).

use super::error::StateError;
use super::message::StateRequest;
use crate::model::ServiceState;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// A type-safe client for the state table actor.
///
/// Holds only a sender, so clones are cheap and can be moved into every
/// service task.
#[derive(Clone, Debug)]
pub struct StateClient {
    sender: mpsc::Sender<StateRequest>,
}

impl StateClient {
    pub fn new(sender: mpsc::Sender<StateRequest>) -> Self {
        Self { sender }
    }

    pub async fn register(&self, service: impl Into<String>) -> Result<(), StateError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Register {
                service: service.into(),
                respond_to,
            })
            .await
            .map_err(|_| StateError::ActorClosed)?;
        response.await.map_err(|_| StateError::ActorDropped)?
    }

    /// Requests a transition and returns the state it replaced.
    #[instrument(skip(self, to), fields(to = %to))]
    pub async fn transition(&self, service: &str, to: ServiceState) -> Result<ServiceState, StateError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Transition {
                service: service.to_string(),
                to,
                respond_to,
            })
            .await
            .map_err(|_| StateError::ActorClosed)?;
        response.await.map_err(|_| StateError::ActorDropped)?
    }

    pub async fn get(&self, service: impl Into<String>) -> Result<ServiceState, StateError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Get {
                service: service.into(),
                respond_to,
            })
            .await
            .map_err(|_| StateError::ActorClosed)?;
        response.await.map_err(|_| StateError::ActorDropped)?
    }

    pub async fn snapshot(&self) -> Result<Vec<(String, ServiceState)>, StateError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StateRequest::Snapshot { respond_to })
            .await
            .map_err(|_| StateError::ActorClosed)?;
        response.await.map_err(|_| StateError::ActorDropped)?
    }
}
