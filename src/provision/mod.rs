//! # Resource Provisioner
//!
//! Runs a service's [`ProvisioningAction`]s in declared order once the
//! service is healthy. Every action is check-then-act:
//!
//! 1. run the read-only `check`; if it holds, skip the action
//! 2. otherwise `apply`, then re-run `check` to confirm convergence
//!
//! A second run over an already-provisioned service therefore applies
//! nothing and reports every action as already satisfied. The first failing
//! action stops the list; earlier actions stay applied.

pub mod error;
pub mod executor;

pub use error::ProvisionError;
pub use executor::{ProvisionExecutor, ShellExecutor};

use crate::model::ProvisioningAction;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// What a successful [`Provisioner::provision`] did, by action name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionSummary {
    pub applied: Vec<String>,
    pub already_satisfied: Vec<String>,
}

impl ProvisionSummary {
    /// True when the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// An action whose check does not currently hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub action: String,
    /// Set when the check itself could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Provisioner {
    executor: Arc<dyn ProvisionExecutor>,
    cancel: CancellationToken,
}

impl Provisioner {
    pub fn new(executor: Arc<dyn ProvisionExecutor>, cancel: CancellationToken) -> Self {
        Self { executor, cancel }
    }

    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    pub async fn provision(
        &self,
        service: &str,
        actions: &[ProvisioningAction],
    ) -> Result<ProvisionSummary, ProvisionError> {
        let mut summary = ProvisionSummary::default();

        for action in actions {
            if self.cancel.is_cancelled() {
                info!(action = %action.name, "Provisioning abandoned");
                return Err(ProvisionError::Abandoned {
                    service: service.to_string(),
                    at: action.name.clone(),
                });
            }

            let failed = |reason: String| {
                warn!(action = %action.name, %reason, "Provisioning action failed");
                ProvisionError::ActionFailed {
                    service: service.to_string(),
                    action: action.name.clone(),
                    reason,
                }
            };

            let satisfied = self.check(service, action).await.map_err(failed)?;
            if satisfied {
                info!(action = %action.name, kind = %action.kind, "Already satisfied");
                summary.already_satisfied.push(action.name.clone());
                continue;
            }

            bounded(action.timeout, "apply", self.executor.apply(service, action))
                .await
                .map_err(failed)?;

            let converged = self.check(service, action).await.map_err(failed)?;
            if !converged {
                return Err(failed("did not converge: check still unsatisfied after apply".into()));
            }

            info!(action = %action.name, kind = %action.kind, resource = %action.resource, "Applied");
            summary.applied.push(action.name.clone());
        }

        Ok(summary)
    }

    /// Runs only the checks and lists the actions that do not hold. Never applies.
    pub async fn pending(&self, service: &str, actions: &[ProvisioningAction]) -> Vec<PendingAction> {
        let mut pending = Vec::new();
        for action in actions {
            match self.check(service, action).await {
                Ok(true) => {}
                Ok(false) => pending.push(PendingAction {
                    action: action.name.clone(),
                    error: None,
                }),
                Err(error) => pending.push(PendingAction {
                    action: action.name.clone(),
                    error: Some(error),
                }),
            }
        }
        pending
    }

    async fn check(&self, service: &str, action: &ProvisioningAction) -> Result<bool, String> {
        bounded(action.timeout, "check", self.executor.is_satisfied(service, action)).await
    }
}

async fn bounded<T>(
    limit: Duration,
    step: &str,
    call: impl Future<Output = Result<T, String>>,
) -> Result<T, String> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| format!("{step} did not finish within {limit:?}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryExecutor;
    use crate::model::ResourceKind;
    use pretty_assertions::assert_eq;

    fn bucket(name: &str) -> ProvisioningAction {
        ProvisioningAction::new(
            format!("create-{name}"),
            ResourceKind::Bucket,
            name,
            "mc ls",
            "mc mb",
        )
    }

    fn provisioner(executor: &MemoryExecutor) -> Provisioner {
        Provisioner::new(Arc::new(executor.clone()), CancellationToken::new())
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let executor = MemoryExecutor::new();
        let actions = [bucket("warehouse"), bucket("airflow-logs")];
        let provisioner = provisioner(&executor);

        let first = provisioner.provision("minio", &actions).await.unwrap();
        assert_eq!(first.applied, vec!["create-warehouse", "create-airflow-logs"]);

        let second = provisioner.provision("minio", &actions).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(
            second.already_satisfied,
            vec!["create-warehouse", "create-airflow-logs"]
        );
        assert_eq!(executor.apply_count("minio", "create-warehouse"), 1);
    }

    #[tokio::test]
    async fn preexisting_resources_are_skipped() {
        let executor = MemoryExecutor::new();
        executor.seed("minio", "warehouse");
        let summary = provisioner(&executor)
            .provision("minio", &[bucket("warehouse"), bucket("spark-events")])
            .await
            .unwrap();

        assert_eq!(summary.already_satisfied, vec!["create-warehouse"]);
        assert_eq!(summary.applied, vec!["create-spark-events"]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_list_without_rollback() {
        let executor = MemoryExecutor::new();
        executor.fail_apply("minio", "create-b", "access denied");
        let actions = [bucket("a"), bucket("b"), bucket("c")];

        let err = provisioner(&executor)
            .provision("minio", &actions)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProvisionError::ActionFailed {
                service: "minio".into(),
                action: "create-b".into(),
                reason: "access denied".into(),
            }
        );
        assert_eq!(executor.resources("minio"), vec!["a"]);
        assert_eq!(executor.apply_count("minio", "create-c"), 0);
    }

    #[tokio::test]
    async fn apply_that_does_not_converge_fails() {
        let executor = MemoryExecutor::new();
        executor.ignore_apply("postgres", "create-hive");
        let action = ProvisioningAction::new("create-hive", ResourceKind::Schema, "hive", "", "");

        let err = provisioner(&executor)
            .provision("postgres", &[action])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not converge"));
    }

    #[tokio::test]
    async fn cancellation_is_honoured_between_actions() {
        let executor = MemoryExecutor::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provisioner = Provisioner::new(Arc::new(executor.clone()), cancel);

        let err = provisioner
            .provision("minio", &[bucket("warehouse")])
            .await
            .unwrap_err();
        assert_eq!(err.action(), "create-warehouse");
        assert!(matches!(err, ProvisionError::Abandoned { .. }));
        assert!(executor.resources("minio").is_empty());
    }

    /// Raises the stop signal while applying, like Ctrl-C mid-action.
    struct StopDuringApply {
        inner: MemoryExecutor,
        cancel: CancellationToken,
    }

    #[async_trait::async_trait]
    impl ProvisionExecutor for StopDuringApply {
        async fn is_satisfied(&self, service: &str, action: &ProvisioningAction) -> Result<bool, String> {
            self.inner.is_satisfied(service, action).await
        }

        async fn apply(&self, service: &str, action: &ProvisioningAction) -> Result<(), String> {
            self.cancel.cancel();
            self.inner.apply(service, action).await
        }
    }

    #[tokio::test]
    async fn stop_during_apply_finishes_that_action_and_skips_the_rest() {
        let executor = MemoryExecutor::new();
        let cancel = CancellationToken::new();
        let stopping = StopDuringApply {
            inner: executor.clone(),
            cancel: cancel.clone(),
        };
        let provisioner = Provisioner::new(Arc::new(stopping), cancel);

        let err = provisioner
            .provision("minio", &[bucket("warehouse"), bucket("spark-events")])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProvisionError::Abandoned {
                service: "minio".into(),
                at: "create-spark-events".into(),
            }
        );
        assert_eq!(executor.resources("minio"), vec!["warehouse"]);
        assert_eq!(executor.apply_count("minio", "create-warehouse"), 1);
        assert_eq!(executor.apply_count("minio", "create-spark-events"), 0);
    }

    #[tokio::test]
    async fn pending_lists_unsatisfied_checks_without_applying() {
        let executor = MemoryExecutor::new();
        executor.seed("minio", "warehouse");
        let pending = provisioner(&executor)
            .pending("minio", &[bucket("warehouse"), bucket("spark-events")])
            .await;

        assert_eq!(
            pending,
            vec![PendingAction {
                action: "create-spark-events".into(),
                error: None
            }]
        );
        assert!(executor.resources("minio") == vec!["warehouse"]);
    }
}
