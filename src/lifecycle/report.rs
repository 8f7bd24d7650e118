//! Run and status reports.
//!
//! Only terminal states are stored by the state table. `Blocked` and
//! `Interrupted` are derived here from the final snapshot and the graph.

use crate::model::{Failure, ServiceState};
use crate::provision::PendingAction;
use crate::registry::Registry;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Overall result of [`Controller::run`](super::Controller::run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    AllReady,
    PartialFailure,
    /// A stop signal arrived before every service settled.
    Interrupted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::AllReady => "all ready",
            RunOutcome::PartialFailure => "partial failure",
            RunOutcome::Interrupted => "interrupted",
        })
    }
}

/// Final status of one service after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceStatus {
    Ready,
    Failed { failure: Failure },
    ProvisionFailed { action: String, reason: String },
    /// Never started; `by` names the failed ancestors responsible.
    Blocked { by: Vec<String> },
    /// Left in a non-terminal state by a stop signal.
    Interrupted { state: ServiceState },
}

impl ServiceStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceStatus::Ready)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Ready => f.write_str("ready"),
            ServiceStatus::Failed { failure } => write!(f, "failed: {failure}"),
            ServiceStatus::ProvisionFailed { action, reason } => {
                write!(f, "provision failed at `{action}`: {reason}")
            }
            ServiceStatus::Blocked { by } => write!(f, "blocked by {}", by.join(", ")),
            ServiceStatus::Interrupted { state } => write!(f, "interrupted while {state}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub service: String,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub stack: String,
    pub outcome: RunOutcome,
    /// Every service, in bring-up order.
    pub services: Vec<ServiceReport>,
}

impl RunReport {
    /// Builds the report from the state table's final snapshot.
    ///
    /// A non-terminal service is `Blocked` when some dependency edge could
    /// never be satisfied, otherwise `Interrupted`.
    pub fn build(registry: &Registry, snapshot: Vec<(String, ServiceState)>, interrupted: bool) -> Self {
        let states: HashMap<&str, &ServiceState> =
            snapshot.iter().map(|(name, state)| (name.as_str(), state)).collect();

        let services: Vec<ServiceReport> = snapshot
            .iter()
            .map(|(service, state)| {
                let status = match state {
                    ServiceState::Ready => ServiceStatus::Ready,
                    ServiceState::Failed { failure } => ServiceStatus::Failed {
                        failure: failure.clone(),
                    },
                    ServiceState::ProvisionFailed { action, reason } => {
                        ServiceStatus::ProvisionFailed {
                            action: action.clone(),
                            reason: reason.clone(),
                        }
                    }
                    other => {
                        let mut by = BTreeSet::new();
                        collect_blockers(registry, &states, service, &mut by);
                        if by.is_empty() {
                            ServiceStatus::Interrupted {
                                state: other.clone(),
                            }
                        } else {
                            ServiceStatus::Blocked {
                                by: by.into_iter().collect(),
                            }
                        }
                    }
                };
                ServiceReport {
                    service: service.clone(),
                    status,
                }
            })
            .collect();

        let outcome = if services.iter().all(|s| s.status.is_ready()) {
            RunOutcome::AllReady
        } else if interrupted
            && services
                .iter()
                .any(|s| matches!(s.status, ServiceStatus::Interrupted { .. }))
        {
            RunOutcome::Interrupted
        } else {
            RunOutcome::PartialFailure
        };

        Self {
            stack: registry.name().to_string(),
            outcome,
            services,
        }
    }

    pub fn status_of(&self, service: &str) -> Option<&ServiceStatus> {
        self.services
            .iter()
            .find(|report| report.service == service)
            .map(|report| &report.status)
    }

    /// Services that did not end `Ready`.
    pub fn unready(&self) -> impl Iterator<Item = &ServiceReport> {
        self.services.iter().filter(|report| !report.status.is_ready())
    }

    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::AllReady => 0,
            RunOutcome::PartialFailure => 1,
            RunOutcome::Interrupted => 130,
        }
    }
}

/// Adds to `by` every terminal ancestor whose state fails the edge leading to `service`.
fn collect_blockers(
    registry: &Registry,
    states: &HashMap<&str, &ServiceState>,
    service: &str,
    by: &mut BTreeSet<String>,
) {
    let Some(spec) = registry.get(service) else {
        return;
    };
    for dependency in &spec.depends_on {
        let Some(state) = states.get(dependency.service.as_str()) else {
            continue;
        };
        if state.satisfies(dependency.requires) {
            continue;
        }
        if state.is_terminal() {
            by.insert(dependency.service.clone());
        } else {
            collect_blockers(registry, states, &dependency.service, by);
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stack `{}`: {}", self.stack, self.outcome)?;
        let width = column_width(self.services.iter().map(|s| s.service.as_str()));
        for report in &self.services {
            writeln!(f, "  {:<width$}  {}", report.service, report.status)?;
        }
        Ok(())
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// One service's line in [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub service: String,
    pub healthy: bool,
    /// Probe failure reason when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Provisioning checks that do not hold. Only evaluated for healthy services.
    pub pending_actions: Vec<PendingAction>,
}

impl StatusLine {
    pub fn is_converged(&self) -> bool {
        self.healthy && self.pending_actions.is_empty()
    }
}

/// Result of [`Controller::status`](super::Controller::status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub stack: String,
    pub services: Vec<StatusLine>,
}

impl StatusReport {
    pub fn line(&self, service: &str) -> Option<&StatusLine> {
        self.services.iter().find(|line| line.service == service)
    }

    pub fn exit_code(&self) -> u8 {
        if self.services.iter().all(StatusLine::is_converged) {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stack `{}`", self.stack)?;
        let width = column_width(self.services.iter().map(|s| s.service.as_str()));
        for line in &self.services {
            write!(f, "  {:<width$}  ", line.service)?;
            match (&line.detail, line.healthy) {
                (Some(detail), false) => writeln!(f, "unhealthy: {detail}")?,
                (None, false) => writeln!(f, "unhealthy")?,
                _ if line.pending_actions.is_empty() => writeln!(f, "healthy")?,
                _ => {
                    let names: Vec<&str> = line
                        .pending_actions
                        .iter()
                        .map(|pending| pending.action.as_str())
                        .collect();
                    writeln!(f, "healthy, pending: {}", names.join(", "))?
                }
            }
        }
        Ok(())
    }
}

fn column_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HealthCheck, ServiceSpec};
    use pretty_assertions::assert_eq;

    fn registry() -> Registry {
        let tcp = || HealthCheck::tcp("127.0.0.1:1");
        Registry::from_specs(
            "lakehouse",
            vec![
                ServiceSpec::new("postgres", "up postgres", tcp()),
                ServiceSpec::new("minio", "up minio", tcp()),
                ServiceSpec::new("metastore", "up metastore", tcp()).depends_on("postgres"),
                ServiceSpec::new("spark", "up spark", tcp())
                    .depends_on("metastore")
                    .depends_on_healthy("minio"),
            ],
        )
        .unwrap()
    }

    fn timed_out() -> ServiceState {
        ServiceState::Failed {
            failure: Failure::TimedOut {
                attempts: 3,
                last_error: "connection refused".into(),
            },
        }
    }

    #[test]
    fn transitive_blockers_name_the_failed_root() {
        let snapshot = vec![
            ("postgres".to_string(), timed_out()),
            ("minio".to_string(), ServiceState::Ready),
            ("metastore".to_string(), ServiceState::Pending),
            ("spark".to_string(), ServiceState::Pending),
        ];
        let report = RunReport::build(&registry(), snapshot, false);

        assert_eq!(report.outcome, RunOutcome::PartialFailure);
        assert_eq!(
            report.status_of("spark"),
            Some(&ServiceStatus::Blocked {
                by: vec!["postgres".into()]
            })
        );
        assert_eq!(report.exit_code(), 1);
        assert_eq!(
            report.unready().map(|r| r.service.as_str()).collect::<Vec<_>>(),
            vec!["postgres", "metastore", "spark"]
        );
    }

    #[test]
    fn non_terminal_without_blockers_is_interrupted() {
        let snapshot = vec![
            ("postgres".to_string(), ServiceState::Ready),
            ("minio".to_string(), ServiceState::AwaitingReady),
            ("metastore".to_string(), ServiceState::Pending),
            ("spark".to_string(), ServiceState::Pending),
        ];
        let report = RunReport::build(&registry(), snapshot, true);

        assert_eq!(report.outcome, RunOutcome::Interrupted);
        assert_eq!(report.exit_code(), 130);
        assert_eq!(
            report.status_of("minio"),
            Some(&ServiceStatus::Interrupted {
                state: ServiceState::AwaitingReady
            })
        );
    }

    #[test]
    fn display_renders_one_line_per_service() {
        let snapshot = vec![
            ("postgres".to_string(), timed_out()),
            ("minio".to_string(), ServiceState::Ready),
            ("metastore".to_string(), ServiceState::Pending),
            ("spark".to_string(), ServiceState::Pending),
        ];
        let rendered = RunReport::build(&registry(), snapshot, false).to_string();
        assert_eq!(
            rendered,
            "stack `lakehouse`: partial failure\n\
             \x20 postgres   failed: timed out after 3 attempt(s), last error: connection refused\n\
             \x20 minio      ready\n\
             \x20 metastore  blocked by postgres\n\
             \x20 spark      blocked by postgres\n"
        );
    }

    #[test]
    fn json_flattens_the_status() {
        let report = ServiceReport {
            service: "minio".into(),
            status: ServiceStatus::ProvisionFailed {
                action: "create-warehouse".into(),
                reason: "access denied".into(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "service": "minio",
                "status": "provision_failed",
                "action": "create-warehouse",
                "reason": "access denied"
            })
        );
    }

    #[test]
    fn status_exit_code_requires_health_and_provisioning() {
        let mut report = StatusReport {
            stack: "lakehouse".into(),
            services: vec![StatusLine {
                service: "minio".into(),
                healthy: true,
                detail: None,
                pending_actions: vec![],
            }],
        };
        assert_eq!(report.exit_code(), 0);

        report.services[0].pending_actions.push(PendingAction {
            action: "create-warehouse".into(),
            error: None,
        });
        assert_eq!(report.exit_code(), 1);
    }
}
