//! # stackup
//!
//! > **Bring a stack of interdependent services up, in order, for real.**
//!
//! `stackup` starts a set of stateful services (a database, an object store,
//! a metastore, compute and notebook frontends...) in dependency order. It
//! gates every service on real readiness instead of process start, then
//! provisions the shared resources each one needs (buckets, schemas, users,
//! grants) with check-then-act idempotency. Running it twice converges to the
//! same end state.
//!
//! ## 🏗️ Design
//!
//! ### One task per service, one owner for state
//! Every service gets its own Tokio task. Tasks never share mutable state:
//! the per-service lifecycle state lives in the [`StateTable`](state::StateTable)
//! actor, and each task is the only writer of its own entry. Dependents wait
//! on a completion signal and then read the dependency's recorded state.
//!
//! ### Bounded waiting
//! Every wait is bounded: health probes by attempts and an optional budget,
//! provisioning steps and start commands by timeouts. A run always
//! terminates, and a stop signal (Ctrl-C) ends it after the current probe
//! attempt or provisioning action.
//!
//! ### Failures stay local
//! A service that fails to start, never becomes healthy or fails
//! provisioning only blocks its own dependents. Independent services carry
//! on, and the final [`RunReport`](lifecycle::RunReport) names every failure
//! and what it blocked.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Definitions ([`model`], [`registry`])
//! - **Role**: immutable [`ServiceSpec`](model::ServiceSpec)s loaded from a
//!   TOML stack file, plus the [`ServiceState`](model::ServiceState) machine.
//!
//! ### 2. The Order ([`graph`])
//! - **Role**: validates the dependency graph (no cycles, no unknown names)
//!   and layers it into bring-up waves.
//!
//! ### 3. The Workers ([`probe`], [`provision`], [`runtime`])
//! - **Role**: bounded readiness polling, idempotent provisioning, and the
//!   shell-based launcher. Each external call sits behind a trait
//!   ([`Launcher`](runtime::Launcher), [`HealthProbe`](probe::HealthProbe),
//!   [`ProvisionExecutor`](provision::ProvisionExecutor)).
//!
//! ### 4. The Orchestrator ([`lifecycle`], [`state`])
//! - **Role**: the [`Controller`](lifecycle::Controller) wires everything
//!   together and drives the run; the state table records it.
//!
//! ## 🧪 Testing
//!
//! [`mock`] provides in-memory doubles for the three collaborators, so whole
//! runs can be exercised deterministically, with paused Tokio time.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! stackup --config demos/lakehouse.toml run
//! stackup --config demos/lakehouse.toml --json status
//! ```

pub mod graph;
pub mod lifecycle;
pub mod mock;
pub mod model;
pub mod probe;
pub mod provision;
pub mod registry;
pub mod runtime;
pub mod state;
