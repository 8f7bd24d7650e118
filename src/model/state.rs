//! Per-service runtime state and its legal transitions.

use super::service::Requirement;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of one service during a run.
///
/// ```text
/// Pending -> Starting -> AwaitingReady -> Ready
///               |             |  \-----> ProvisionFailed
///               v             v
///             Failed        Failed        (AwaitingReady -> Starting on restart)
/// ```
///
/// Only the state table mutates these values, and only through
/// [`ServiceState::can_transition_to`]-approved transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Pending,
    Starting,
    AwaitingReady,
    /// Healthy and fully provisioned.
    Ready,
    /// Healthy, but a provisioning action failed.
    ProvisionFailed { action: String, reason: String },
    /// Never became healthy.
    Failed { failure: Failure },
}

impl ServiceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServiceState::Ready | ServiceState::ProvisionFailed { .. } | ServiceState::Failed { .. }
        )
    }

    /// Whether a dependent with the given requirement may start on top of this state.
    pub fn satisfies(&self, requirement: Requirement) -> bool {
        match self {
            ServiceState::Ready => true,
            ServiceState::ProvisionFailed { .. } => requirement == Requirement::Healthy,
            _ => false,
        }
    }

    pub fn can_transition_to(&self, next: &ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, AwaitingReady)
                | (Starting, Failed { .. })
                | (AwaitingReady, Ready)
                | (AwaitingReady, ProvisionFailed { .. })
                | (AwaitingReady, Failed { .. })
                | (AwaitingReady, Starting)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceState::Pending => "pending",
            ServiceState::Starting => "starting",
            ServiceState::AwaitingReady => "awaiting-ready",
            ServiceState::Ready => "ready",
            ServiceState::ProvisionFailed { .. } => "provision-failed",
            ServiceState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a service ended in [`ServiceState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// The launcher could not start the service.
    StartFailure { reason: String },
    /// The health check never succeeded within its budget.
    TimedOut { attempts: u32, last_error: String },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::StartFailure { reason } => write!(f, "start failure: {reason}"),
            Failure::TimedOut {
                attempts,
                last_error,
            } => write!(
                f,
                "timed out after {attempts} attempt(s), last error: {last_error}"
            ),
        }
    }
}
