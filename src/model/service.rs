//! Static service definitions.
//!
//! A [`ServiceSpec`] is built once, at registry load time, and never mutated
//! afterwards. Everything the orchestrator needs to know about a service lives
//! here: how to start it, what it waits for, how to tell that it is healthy,
//! and which resources must exist once it is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default pause between two health-check attempts.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(2);
/// Default bound on a single health-check attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default number of consecutive failed attempts before a probe gives up.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 30;
/// Default bound on a single provisioning `check` or `apply` call.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Definition of one service in the stack.
///
/// # Example
/// ```
/// use stackup::model::{HealthCheck, ServiceSpec};
///
/// let metastore = ServiceSpec::new(
///     "metastore",
///     "docker compose up -d hive-metastore",
///     HealthCheck::tcp("127.0.0.1:9083"),
/// )
/// .depends_on("postgres");
///
/// assert_eq!(metastore.dependency_names().collect::<Vec<_>>(), vec!["postgres"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    /// Unique name within the registry.
    pub name: String,
    /// Start reference handed to the [`Launcher`](crate::runtime::Launcher).
    pub start: String,
    /// Services that must be settled before this one may start, in declared order.
    pub depends_on: Vec<Dependency>,
    pub health: HealthCheck,
    /// Setup actions, run in order once the service is healthy.
    pub provision: Vec<ProvisioningAction>,
    pub restart: RestartPolicy,
}

impl ServiceSpec {
    /// Creates a spec with no dependencies, no provisioning and [`RestartPolicy::Never`].
    pub fn new(name: impl Into<String>, start: impl Into<String>, health: HealthCheck) -> Self {
        Self {
            name: name.into(),
            start: start.into(),
            depends_on: Vec::new(),
            health,
            provision: Vec::new(),
            restart: RestartPolicy::Never,
        }
    }

    /// Adds a dependency that must reach `Ready` (healthy and provisioned).
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(Dependency::provisioned(service));
        self
    }

    /// Adds a dependency that only needs to be healthy.
    pub fn depends_on_healthy(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(Dependency::healthy(service));
        self
    }

    pub fn with_action(mut self, action: ProvisioningAction) -> Self {
        self.provision.push(action);
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().map(|dep| dep.service.as_str())
    }
}

// =============================================================================
// DEPENDENCIES
// =============================================================================

/// What a dependent needs from one of its dependencies before it may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    /// The dependency must be healthy *and* fully provisioned.
    #[default]
    Provisioned,
    /// The dependency must be healthy; failed provisioning does not block.
    Healthy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub service: String,
    pub requires: Requirement,
}

impl Dependency {
    pub fn provisioned(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            requires: Requirement::Provisioned,
        }
    }

    pub fn healthy(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            requires: Requirement::Healthy,
        }
    }
}

// =============================================================================
// HEALTH CHECKS
// =============================================================================

/// Stateless readiness descriptor, evaluated repeatedly by the
/// [`Prober`](crate::probe::Prober).
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheck {
    pub protocol: Protocol,
    /// Pause between two attempts.
    pub interval: Duration,
    /// Bound on a single attempt.
    pub timeout: Duration,
    /// Consecutive failures tolerated before the probe times out. Always >= 1.
    pub max_attempts: u32,
    /// Optional wall-clock budget for the whole probe.
    pub budget: Option<Duration>,
}

impl HealthCheck {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
            max_attempts: DEFAULT_PROBE_ATTEMPTS,
            budget: None,
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(Protocol::Tcp {
            address: address.into(),
        })
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::new(Protocol::Http {
            url: url.into(),
            expect_status: None,
        })
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::new(Protocol::Command {
            command: command.into(),
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// How a health check talks to its service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// Healthy once a TCP connection to `address` succeeds.
    Tcp { address: String },
    /// Healthy once a GET on `url` answers `expect_status`, or any 2xx when unset.
    Http {
        url: String,
        expect_status: Option<u16>,
    },
    /// Healthy once the shell command exits with status 0 (e.g. `pg_isready`).
    Command { command: String },
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp { address } => write!(f, "tcp {address}"),
            Protocol::Http { url, .. } => write!(f, "http {url}"),
            Protocol::Command { command } => write!(f, "command `{command}`"),
        }
    }
}

// =============================================================================
// PROVISIONING
// =============================================================================

/// Kind of data-plane resource a provisioning action manages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Bucket,
    Schema,
    User,
    Grant,
    Network,
    #[default]
    Custom,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Schema => "schema",
            ResourceKind::User => "user",
            ResourceKind::Grant => "grant",
            ResourceKind::Network => "network",
            ResourceKind::Custom => "custom",
        };
        f.write_str(label)
    }
}

/// An idempotent setup step: `check` reports whether the desired state
/// already holds, `apply` brings it about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningAction {
    pub name: String,
    pub kind: ResourceKind,
    pub resource: String,
    /// Read-only precondition; exit status 0 means "already satisfied".
    pub check: String,
    /// Mutation run only when `check` is unsatisfied.
    pub apply: String,
    /// Bound on each `check` and `apply` call.
    pub timeout: Duration,
}

impl ProvisioningAction {
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        resource: impl Into<String>,
        check: impl Into<String>,
        apply: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            resource: resource.into(),
            check: check.into(),
            apply: apply.into(),
            timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// RESTART POLICY
// =============================================================================

/// What to do when a launched service never becomes healthy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    #[default]
    Never,
    /// Relaunch and re-probe up to `max_restarts` more times.
    OnFailure { max_restarts: u32 },
}

impl RestartPolicy {
    /// Total number of launches this policy allows, first one included.
    pub fn launch_attempts(&self) -> u32 {
        match self {
            RestartPolicy::Never => 1,
            RestartPolicy::OnFailure { max_restarts } => max_restarts.saturating_add(1),
        }
    }
}
