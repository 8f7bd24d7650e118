//! Execution of provisioning `check` and `apply` steps.

use crate::model::ProvisioningAction;
use crate::runtime::run_shell;
use async_trait::async_trait;
use tracing::debug;

/// Runs the two halves of a [`ProvisioningAction`] against the data plane.
#[async_trait]
pub trait ProvisionExecutor: Send + Sync {
    /// `Ok(true)` when the desired state already holds. Must not mutate anything.
    async fn is_satisfied(&self, service: &str, action: &ProvisioningAction) -> Result<bool, String>;

    async fn apply(&self, service: &str, action: &ProvisioningAction) -> Result<(), String>;
}

/// Runs `check` and `apply` as shell commands.
///
/// A `check` exiting 0 means satisfied, any other exit status means
/// unsatisfied. Only a check that cannot run at all is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl ProvisionExecutor for ShellExecutor {
    async fn is_satisfied(&self, service: &str, action: &ProvisioningAction) -> Result<bool, String> {
        let output = run_shell(&action.check, action.timeout)
            .await
            .map_err(|err| format!("check could not run: {err}"))?;
        debug!(service, action = %action.name, satisfied = output.success, "Checked");
        Ok(output.success)
    }

    async fn apply(&self, service: &str, action: &ProvisioningAction) -> Result<(), String> {
        let output = run_shell(&action.apply, action.timeout)
            .await
            .map_err(|err| format!("apply could not run: {err}"))?;
        debug!(service, action = %action.name, success = output.success, "Applied");
        if output.success {
            Ok(())
        } else {
            Err(output.describe_failure())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;

    #[tokio::test]
    async fn shell_executor_converges_on_a_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("bucket-warehouse");
        let marker = marker.display();
        let action = ProvisioningAction::new(
            "create-warehouse-bucket",
            ResourceKind::Bucket,
            "warehouse",
            format!("test -e {marker}"),
            format!("touch {marker}"),
        );

        let executor = ShellExecutor;
        assert!(!executor.is_satisfied("minio", &action).await.unwrap());
        executor.apply("minio", &action).await.unwrap();
        assert!(executor.is_satisfied("minio", &action).await.unwrap());
    }

    #[tokio::test]
    async fn failing_apply_reports_stderr() {
        let action = ProvisioningAction::new(
            "create-schema",
            ResourceKind::Schema,
            "hive",
            "exit 1",
            "echo 'permission denied' >&2; exit 1",
        );
        let err = ShellExecutor.apply("postgres", &action).await.unwrap_err();
        assert_eq!(err, "exited with status 1: permission denied");
    }
}
