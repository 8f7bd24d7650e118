//! # State Table Actor
//!
//! The server half of the state table. It owns every service's current
//! [`ServiceState`] and processes requests one at a time, so no lock guards
//! the table: exclusive ownership inside the task is the synchronization.

use super::client::StateClient;
use super::error::StateError;
use super::message::StateRequest;
use crate::model::ServiceState;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The actor owning the per-service state of one run.
///
/// Entries are only written through [`ServiceState::can_transition_to`]-approved
/// transitions; an illegal request is answered with an error and changes nothing.
///
/// # Usage Pattern
///
/// ```
/// use stackup::model::ServiceState;
/// use stackup::state::StateTable;
///
/// #[tokio::main]
/// async fn main() {
///     let (table, client) = StateTable::new(16);
///     tokio::spawn(table.run());
///
///     client.register("postgres").await.unwrap();
///     client.transition("postgres", ServiceState::Starting).await.unwrap();
///     assert_eq!(client.get("postgres").await.unwrap(), ServiceState::Starting);
/// }
/// ```
pub struct StateTable {
    receiver: mpsc::Receiver<StateRequest>,
    entries: HashMap<String, ServiceState>,
    order: Vec<String>,
}

impl StateTable {
    /// Creates the table and its client.
    ///
    /// `buffer_size` bounds the request channel; clients wait when it is full.
    pub fn new(buffer_size: usize) -> (Self, StateClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let table = Self {
            receiver,
            entries: HashMap::new(),
            order: Vec::new(),
        };
        (table, StateClient::new(sender))
    }

    /// Runs the request loop until every client has been dropped.
    pub async fn run(mut self) {
        info!("State table started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StateRequest::Register {
                    service,
                    respond_to,
                } => {
                    if self.entries.contains_key(&service) {
                        warn!(%service, "Already registered");
                        let _ = respond_to.send(Err(StateError::AlreadyRegistered(service)));
                        continue;
                    }
                    self.entries.insert(service.clone(), ServiceState::Pending);
                    self.order.push(service.clone());
                    debug!(%service, size = self.entries.len(), "Registered");
                    let _ = respond_to.send(Ok(()));
                }
                StateRequest::Transition {
                    service,
                    to,
                    respond_to,
                } => {
                    let result = self.transition(&service, to);
                    let _ = respond_to.send(result);
                }
                StateRequest::Get {
                    service,
                    respond_to,
                } => {
                    let state = self
                        .entries
                        .get(&service)
                        .cloned()
                        .ok_or(StateError::NotFound(service));
                    let _ = respond_to.send(state);
                }
                StateRequest::Snapshot { respond_to } => {
                    let snapshot = self
                        .order
                        .iter()
                        .filter_map(|service| {
                            let state = self.entries.get(service)?.clone();
                            Some((service.clone(), state))
                        })
                        .collect();
                    let _ = respond_to.send(Ok(snapshot));
                }
            }
        }

        info!(size = self.entries.len(), "State table shutdown");
    }

    fn transition(&mut self, service: &str, to: ServiceState) -> Result<ServiceState, StateError> {
        let Some(entry) = self.entries.get_mut(service) else {
            warn!(%service, "Not found");
            return Err(StateError::NotFound(service.to_string()));
        };

        if !entry.can_transition_to(&to) {
            let from = entry.clone();
            warn!(%service, %from, %to, "Illegal transition");
            return Err(StateError::IllegalTransition {
                service: service.to_string(),
                from,
                to,
            });
        }

        info!(%service, from = %entry, %to, "Transition");
        Ok(std::mem::replace(entry, to))
    }
}
