//! The controller's state table: an actor owning every service's [`ServiceState`](crate::model::ServiceState).
//!
//! # Main Components
//!
//! - [`StateTable`] - the actor; owns the entries, validates transitions
//! - [`StateClient`] - cloneable handle used by service tasks
//! - [`StateRequest`] - the messages between the two
//! - [`StateError`] - protocol errors (closed table, unknown service, illegal transition)

pub mod client;
pub mod error;
pub mod message;
pub mod table;

pub use client::StateClient;
pub use error::StateError;
pub use message::{Response, StateRequest};
pub use table::StateTable;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceState;

    fn spawn_table() -> StateClient {
        let (table, client) = StateTable::new(16);
        tokio::spawn(table.run());
        client
    }

    #[tokio::test]
    async fn transitions_follow_the_state_machine() {
        let client = spawn_table();
        client.register("postgres").await.unwrap();

        let previous = client.transition("postgres", ServiceState::Starting).await.unwrap();
        assert_eq!(previous, ServiceState::Pending);
        client
            .transition("postgres", ServiceState::AwaitingReady)
            .await
            .unwrap();
        client.transition("postgres", ServiceState::Ready).await.unwrap();

        let err = client
            .transition("postgres", ServiceState::Starting)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StateError::IllegalTransition {
                service: "postgres".into(),
                from: ServiceState::Ready,
                to: ServiceState::Starting,
            }
        );
        assert_eq!(client.get("postgres").await.unwrap(), ServiceState::Ready);
    }

    #[tokio::test]
    async fn pending_cannot_jump_to_ready() {
        let client = spawn_table();
        client.register("spark").await.unwrap();
        let err = client.transition("spark", ServiceState::Ready).await.unwrap_err();
        assert!(matches!(err, StateError::IllegalTransition { .. }));
        assert_eq!(client.get("spark").await.unwrap(), ServiceState::Pending);
    }

    #[tokio::test]
    async fn register_twice_and_unknown_services_are_rejected() {
        let client = spawn_table();
        client.register("minio").await.unwrap();
        assert_eq!(
            client.register("minio").await.unwrap_err(),
            StateError::AlreadyRegistered("minio".into())
        );
        assert_eq!(
            client.get("hdfs").await.unwrap_err(),
            StateError::NotFound("hdfs".into())
        );
        assert!(client
            .transition("hdfs", ServiceState::Starting)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn snapshot_keeps_registration_order() {
        let client = spawn_table();
        for name in ["postgres", "minio", "metastore"] {
            client.register(name).await.unwrap();
        }
        client.transition("minio", ServiceState::Starting).await.unwrap();

        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(
            snapshot,
            vec![
                ("postgres".to_string(), ServiceState::Pending),
                ("minio".to_string(), ServiceState::Starting),
                ("metastore".to_string(), ServiceState::Pending),
            ]
        );
    }

    #[tokio::test]
    async fn closed_table_reports_actor_closed() {
        let (table, client) = StateTable::new(1);
        drop(table);
        assert_eq!(client.register("x").await.unwrap_err(), StateError::ActorClosed);
    }
}
