//! # Mock Collaborators
//!
//! In-memory stand-ins for the three external collaborators, so the
//! controller can be driven end to end without containers or a network:
//!
//! - [`MockLauncher`] - scripted launch results, records every start
//! - [`ScriptedProbe`] - scripted health-check answers per service
//! - [`MemoryExecutor`] - resources kept in a map; check and apply are real
//!   set lookups and inserts
//!
//! All three can share a [`Timeline`], an ordered log of what happened, to
//! assert ordering across services.
//!
//! # Example
//! ```
//! use stackup::mock::{MockLauncher, ScriptedProbe};
//!
//! let launcher = MockLauncher::new();
//! launcher.expect_start("spark").return_err("image not found");
//!
//! let probe = ScriptedProbe::new();
//! probe.expect_check("postgres").return_err("connection refused");
//! probe.expect_check("postgres").return_ok();
//! ```
//!
//! Services without expectations start fine and answer healthy.

use crate::model::{ProvisioningAction, Protocol, ServiceSpec};
use crate::probe::HealthProbe;
use crate::provision::ProvisionExecutor;
use crate::runtime::{LaunchError, Launcher, ServiceHandle};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// TIMELINE
// =============================================================================

/// Ordered log of collaborator calls, e.g. `start postgres`, `healthy postgres`,
/// `apply minio/create-warehouse`.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Arc<Mutex<Vec<String>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }
}

// =============================================================================
// LAUNCHER
// =============================================================================

struct StartScript {
    delay: Duration,
    response: Result<(), String>,
}

#[derive(Default)]
struct LauncherState {
    expectations: HashMap<String, VecDeque<StartScript>>,
    starts: HashMap<String, u32>,
}

/// A launcher with per-service expectation queues.
///
/// Each start pops the next expectation for that service; an empty queue
/// means "launched".
#[derive(Clone, Default)]
pub struct MockLauncher {
    state: Arc<Mutex<LauncherState>>,
    timeline: Timeline,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(mut self, timeline: &Timeline) -> Self {
        self.timeline = timeline.clone();
        self
    }

    /// Expects a start of `service`.
    pub fn expect_start(&self, service: impl Into<String>) -> StartExpectationBuilder {
        StartExpectationBuilder {
            service: service.into(),
            delay: Duration::ZERO,
            state: self.state.clone(),
        }
    }

    /// How many times `service` was launched.
    pub fn starts(&self, service: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .starts
            .get(service)
            .copied()
            .unwrap_or(0)
    }

    /// Panics if any expectation was not consumed.
    pub fn verify(&self) {
        let state = self.state.lock().unwrap();
        let remaining: usize = state.expectations.values().map(VecDeque::len).sum();
        if remaining > 0 {
            panic!("Not all start expectations were met. {remaining} remaining");
        }
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn start(&self, spec: &ServiceSpec) -> Result<ServiceHandle, LaunchError> {
        let script = {
            let mut state = self.state.lock().unwrap();
            *state.starts.entry(spec.name.clone()).or_default() += 1;
            state
                .expectations
                .get_mut(&spec.name)
                .and_then(VecDeque::pop_front)
        };
        self.timeline.record(format!("start {}", spec.name));

        let response = match script {
            Some(script) => {
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                script.response
            }
            None => Ok(()),
        };

        response
            .map(|()| ServiceHandle {
                service: spec.name.clone(),
                reference: spec.start.clone(),
            })
            .map_err(|reason| LaunchError::Rejected {
                service: spec.name.clone(),
                reason,
            })
    }
}

/// Builder for start expectations.
pub struct StartExpectationBuilder {
    service: String,
    delay: Duration,
    state: Arc<Mutex<LauncherState>>,
}

impl StartExpectationBuilder {
    /// Makes the start take `delay` before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn return_ok(self) {
        self.push(Ok(()));
    }

    pub fn return_err(self, reason: impl Into<String>) {
        self.push(Err(reason.into()));
    }

    fn push(self, response: Result<(), String>) {
        let mut state = self.state.lock().unwrap();
        state
            .expectations
            .entry(self.service)
            .or_default()
            .push_back(StartScript {
                delay: self.delay,
                response,
            });
    }
}

// =============================================================================
// PROBE
// =============================================================================

enum CheckScript {
    Answer(Result<(), String>),
    /// Never answers; only the prober's attempt timeout ends it.
    Hang,
}

#[derive(Default)]
struct ProbeState {
    expectations: HashMap<String, VecDeque<CheckScript>>,
    fail_always: HashMap<String, String>,
    checks: HashMap<String, u32>,
}

/// A health probe answering from per-service scripts.
///
/// Once a service's script is exhausted it answers healthy, unless
/// [`fail_always`](Self::fail_always) was set for it.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    state: Arc<Mutex<ProbeState>>,
    timeline: Timeline,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(mut self, timeline: &Timeline) -> Self {
        self.timeline = timeline.clone();
        self
    }

    pub fn expect_check(&self, service: impl Into<String>) -> CheckExpectationBuilder {
        CheckExpectationBuilder {
            service: service.into(),
            state: self.state.clone(),
        }
    }

    /// Every unscripted check of `service` fails with `reason`.
    pub fn fail_always(&self, service: impl Into<String>, reason: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .fail_always
            .insert(service.into(), reason.into());
    }

    /// Number of checks made against `service`.
    pub fn checks(&self, service: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .checks
            .get(service)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self, service: &str, _protocol: &Protocol) -> Result<(), String> {
        let script = {
            let mut state = self.state.lock().unwrap();
            *state.checks.entry(service.to_string()).or_default() += 1;
            let scripted = state
                .expectations
                .get_mut(service)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(script) => script,
                None => CheckScript::Answer(match state.fail_always.get(service) {
                    Some(reason) => Err(reason.clone()),
                    None => Ok(()),
                }),
            }
        };

        match script {
            CheckScript::Answer(Ok(())) => {
                self.timeline.record(format!("healthy {service}"));
                Ok(())
            }
            CheckScript::Answer(Err(reason)) => Err(reason),
            CheckScript::Hang => std::future::pending().await,
        }
    }
}

/// Builder for health-check expectations.
pub struct CheckExpectationBuilder {
    service: String,
    state: Arc<Mutex<ProbeState>>,
}

impl CheckExpectationBuilder {
    pub fn return_ok(self) {
        self.push(CheckScript::Answer(Ok(())));
    }

    pub fn return_err(self, reason: impl Into<String>) {
        self.push(CheckScript::Answer(Err(reason.into())));
    }

    /// The check never answers.
    pub fn hang(self) {
        self.push(CheckScript::Hang);
    }

    fn push(self, script: CheckScript) {
        let mut state = self.state.lock().unwrap();
        state
            .expectations
            .entry(self.service)
            .or_default()
            .push_back(script);
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

type ActionKey = (String, String);

#[derive(Default)]
struct ExecutorState {
    resources: HashMap<String, BTreeSet<String>>,
    failing: HashMap<ActionKey, String>,
    ignored: HashSet<ActionKey>,
    applies: HashMap<ActionKey, u32>,
}

/// Keeps each service's resources in memory.
///
/// `is_satisfied` holds when the action's `resource` exists for the service;
/// `apply` creates it.
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    state: Arc<Mutex<ExecutorState>>,
    timeline: Timeline,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(mut self, timeline: &Timeline) -> Self {
        self.timeline = timeline.clone();
        self
    }

    /// Marks `resource` as already present, as if created by an earlier run.
    pub fn seed(&self, service: impl Into<String>, resource: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .resources
            .entry(service.into())
            .or_default()
            .insert(resource.into());
    }

    /// Every `apply` of this action fails with `reason`.
    pub fn fail_apply(
        &self,
        service: impl Into<String>,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert((service.into(), action.into()), reason.into());
    }

    /// `apply` of this action reports success without creating anything.
    pub fn ignore_apply(&self, service: impl Into<String>, action: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .ignored
            .insert((service.into(), action.into()));
    }

    pub fn apply_count(&self, service: &str, action: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .applies
            .get(&(service.to_string(), action.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Resources present for `service`, sorted.
    pub fn resources(&self, service: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(service)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProvisionExecutor for MemoryExecutor {
    async fn is_satisfied(&self, service: &str, action: &ProvisioningAction) -> Result<bool, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .resources
            .get(service)
            .is_some_and(|set| set.contains(&action.resource)))
    }

    async fn apply(&self, service: &str, action: &ProvisioningAction) -> Result<(), String> {
        let key = (service.to_string(), action.name.clone());
        let mut state = self.state.lock().unwrap();
        *state.applies.entry(key.clone()).or_default() += 1;

        if let Some(reason) = state.failing.get(&key) {
            return Err(reason.clone());
        }
        if !state.ignored.contains(&key) {
            state
                .resources
                .entry(key.0)
                .or_default()
                .insert(action.resource.clone());
        }
        drop(state);

        self.timeline.record(format!("apply {service}/{}", action.name));
        Ok(())
    }
}
