use super::error::ControllerError;
use super::report::{RunReport, StatusLine, StatusReport};
use crate::graph::{DependencyGraph, GraphError};
use crate::model::{Dependency, Failure, ServiceSpec, ServiceState};
use crate::probe::{HealthProbe, NetworkProbe, ProbeOutcome, Prober};
use crate::provision::{ProvisionError, ProvisionExecutor, Provisioner, ShellExecutor};
use crate::registry::Registry;
use crate::runtime::{Launcher, ShellLauncher};
use crate::state::{StateClient, StateError, StateTable};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

const STATE_CHANNEL_BUFFER: usize = 64;

/// Brings a whole stack up in dependency order.
///
/// `Controller` is responsible for:
/// - **Ordering**: the [`DependencyGraph`] is resolved once, up front; a
///   cycle or unknown dependency means nothing starts
/// - **Concurrency**: one task per service; independent services start,
///   probe and provision in parallel
/// - **Gating**: a task starts its service only after every dependency
///   settled in a state that satisfies the edge's [`Requirement`](crate::model::Requirement)
/// - **Stopping**: on cancellation, in-flight probe attempts and
///   provisioning actions finish and nothing new starts
///
/// # Example
///
/// ```no_run
/// use stackup::lifecycle::Controller;
/// use stackup::registry::Registry;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let controller = Controller::new(Registry::load("stack.toml")?)?;
/// let report = controller.run().await?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    registry: Arc<Registry>,
    graph: Arc<DependencyGraph>,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn HealthProbe>,
    executor: Arc<dyn ProvisionExecutor>,
    cancel: CancellationToken,
}

impl Controller {
    /// A controller that launches, probes and provisions for real.
    pub fn new(registry: Registry) -> Result<Self, GraphError> {
        Self::with_collaborators(
            registry,
            Arc::new(ShellLauncher::default()),
            Arc::new(NetworkProbe::new()),
            Arc::new(ShellExecutor),
        )
    }

    pub fn with_collaborators(
        registry: Registry,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn HealthProbe>,
        executor: Arc<dyn ProvisionExecutor>,
    ) -> Result<Self, GraphError> {
        let graph = DependencyGraph::resolve(&registry)?;
        Ok(Self {
            registry: Arc::new(registry),
            graph: Arc::new(graph),
            launcher,
            probe,
            executor,
            cancel: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Cancelling this token stops the current and every later run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the stack to completion and reports every service's final status.
    ///
    /// Service failures never make this return `Err`; they are part of the
    /// report. `Err` means the run machinery itself broke.
    pub async fn run(&self) -> Result<RunReport, ControllerError> {
        let order = self.graph.order();
        info!(
            stack = %self.registry.name(),
            services = order.len(),
            layers = self.graph.layers().len(),
            "Bringing up stack"
        );

        // =====================================================================
        // Step 1: Start the state table and register every service as Pending
        // =====================================================================

        let (table, states) = StateTable::new(STATE_CHANNEL_BUFFER);
        let table_handle = tokio::spawn(table.run());
        for service in &order {
            states.register(*service).await?;
        }

        // =====================================================================
        // Step 2: Spawn one task per service
        // =====================================================================

        // A child token, so a broken task can stop its siblings without
        // cancelling the caller's token.
        let run_cancel = self.cancel.child_token();
        let prober = Prober::new(self.probe.clone(), run_cancel.clone());
        let provisioner = Provisioner::new(self.executor.clone(), run_cancel.clone());
        let settled: HashMap<&str, CancellationToken> = order
            .iter()
            .map(|service| (*service, CancellationToken::new()))
            .collect();

        let mut tasks = JoinSet::new();
        for spec in order.iter().filter_map(|service| self.registry.get(service)) {
            let dependencies = spec
                .depends_on
                .iter()
                .filter_map(|dep| Some((dep.clone(), settled.get(dep.service.as_str())?.clone())))
                .collect();
            let Some(own) = settled.get(spec.name.as_str()) else {
                continue;
            };

            let task = ServiceTask {
                spec: spec.clone(),
                dependencies,
                settled: own.clone(),
                states: states.clone(),
                launcher: self.launcher.clone(),
                prober: prober.clone(),
                provisioner: provisioner.clone(),
                cancel: run_cancel.clone(),
            };
            tasks.spawn(task.drive().instrument(info_span!("service", service = %spec.name)));
        }

        // =====================================================================
        // Step 3: Wait for every task, then snapshot the table
        // =====================================================================

        let mut broken = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => ControllerError::State(err),
                Err(join_error) => ControllerError::TaskPanicked(join_error.to_string()),
            };
            error!(error = %failure, "Service task broke, stopping the run");
            run_cancel.cancel();
            broken.get_or_insert(failure);
        }

        let snapshot = states.snapshot().await?;
        drop(states);
        if let Err(join_error) = table_handle.await {
            warn!(error = %join_error, "State table task failed");
        }
        if let Some(failure) = broken {
            return Err(failure);
        }

        let report = RunReport::build(&self.registry, snapshot, self.cancel.is_cancelled());
        info!(outcome = %report.outcome, "Run finished");
        Ok(report)
    }

    /// Probes every service once, concurrently, and lists unsatisfied
    /// provisioning checks for the healthy ones. Never launches or applies.
    pub async fn status(&self) -> StatusReport {
        let prober = Prober::new(self.probe.clone(), self.cancel.clone());
        let provisioner = Provisioner::new(self.executor.clone(), self.cancel.clone());

        let mut tasks = JoinSet::new();
        for spec in self.registry.services() {
            let spec = spec.clone();
            let prober = prober.clone();
            let provisioner = provisioner.clone();
            tasks.spawn(async move {
                let line = match prober.probe_once(&spec.name, &spec.health).await {
                    Ok(()) => StatusLine {
                        pending_actions: provisioner.pending(&spec.name, &spec.provision).await,
                        service: spec.name,
                        healthy: true,
                        detail: None,
                    },
                    Err(reason) => StatusLine {
                        service: spec.name,
                        healthy: false,
                        detail: Some(reason),
                        pending_actions: Vec::new(),
                    },
                };
                debug!(service = %line.service, healthy = line.healthy, "Status probed");
                line
            });
        }

        let mut lines: HashMap<String, StatusLine> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(line) => {
                    lines.insert(line.service.clone(), line);
                }
                Err(join_error) => error!(error = %join_error, "Status probe task failed"),
            }
        }

        StatusReport {
            stack: self.registry.name().to_string(),
            services: self
                .graph
                .order()
                .into_iter()
                .filter_map(|service| lines.remove(service))
                .collect(),
        }
    }
}

/// Everything one service needs for its part of the run.
struct ServiceTask {
    spec: ServiceSpec,
    /// Each dependency edge with the dependency's completion signal.
    dependencies: Vec<(Dependency, CancellationToken)>,
    /// Fired when this task ends, however it ends.
    settled: CancellationToken,
    states: StateClient,
    launcher: Arc<dyn Launcher>,
    prober: Prober,
    provisioner: Provisioner,
    cancel: CancellationToken,
}

impl ServiceTask {
    async fn drive(self) -> Result<(), StateError> {
        let _settled = self.settled.clone().drop_guard();
        let name = self.spec.name.as_str();

        // Dependencies
        for (dependency, settled) in &self.dependencies {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Stopped while waiting for dependencies");
                    return Ok(());
                }
                _ = settled.cancelled() => {}
            }
            let state = self.states.get(&dependency.service).await?;
            if !state.satisfies(dependency.requires) {
                warn!(dependency = %dependency.service, %state, "Blocked");
                return Ok(());
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        // Launch and probe, relaunching as the restart policy allows
        let launches = self.spec.restart.launch_attempts();
        let mut launch = 1;
        loop {
            self.states.transition(name, ServiceState::Starting).await?;
            match self.launcher.start(&self.spec).await {
                Ok(handle) => debug!(reference = %handle.reference, launch, "Launch accepted"),
                Err(err) => {
                    warn!(error = %err, "Start failed");
                    let failure = Failure::StartFailure {
                        reason: err.to_string(),
                    };
                    self.states
                        .transition(name, ServiceState::Failed { failure })
                        .await?;
                    return Ok(());
                }
            }

            self.states.transition(name, ServiceState::AwaitingReady).await?;
            match self.prober.wait_until_ready(name, &self.spec.health).await {
                ProbeOutcome::Ready { .. } => break,
                ProbeOutcome::TimedOut {
                    attempts,
                    last_failure,
                } => {
                    if launch < launches && !self.cancel.is_cancelled() {
                        launch += 1;
                        warn!(launch, of = launches, "Never became healthy, restarting");
                        continue;
                    }
                    let failure = Failure::TimedOut {
                        attempts,
                        last_error: last_failure,
                    };
                    self.states
                        .transition(name, ServiceState::Failed { failure })
                        .await?;
                    return Ok(());
                }
                ProbeOutcome::Abandoned { .. } => return Ok(()),
            }
        }

        // Provisioning
        match self.provisioner.provision(name, &self.spec.provision).await {
            Ok(summary) => {
                self.states.transition(name, ServiceState::Ready).await?;
                info!(
                    applied = summary.applied.len(),
                    already_satisfied = summary.already_satisfied.len(),
                    "Ready"
                );
            }
            Err(ProvisionError::ActionFailed { action, reason, .. }) => {
                self.states
                    .transition(name, ServiceState::ProvisionFailed { action, reason })
                    .await?;
            }
            Err(ProvisionError::Abandoned { at, .. }) => {
                info!(at = %at, "Stopped during provisioning");
            }
        }
        Ok(())
    }
}
