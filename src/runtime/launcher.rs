//! Starting services by reference.
//!
//! The orchestrator never knows *how* a service runs (container, process,
//! remote unit); it hands the spec's start reference to a [`Launcher`] and
//! gets back an opaque [`ServiceHandle`].

use super::shell::{run_shell, ShellError};
use crate::model::ServiceSpec;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

/// Default bound on a start command, e.g. `docker compose up -d` pulling an image.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(300);

/// Opaque proof that a launch request was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHandle {
    pub service: String,
    pub reference: String,
}

/// Why a service could not be launched.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("start command for `{service}` failed: {reason}")]
    Command { service: String, reason: String },

    #[error("start command for `{service}` could not run: {source}")]
    Shell {
        service: String,
        #[source]
        source: ShellError,
    },

    /// Raised by launchers that do not shell out.
    #[error("`{service}` refused to start: {reason}")]
    Rejected { service: String, reason: String },
}

/// Starts a named service. The external collaborator for "start service by reference".
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn start(&self, spec: &ServiceSpec) -> Result<ServiceHandle, LaunchError>;
}

/// Runs the start reference as a shell command; exit status 0 means "launched".
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    timeout: Duration,
}

impl ShellLauncher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_START_TIMEOUT)
    }
}

#[async_trait]
impl Launcher for ShellLauncher {
    #[instrument(skip(self, spec), fields(service = %spec.name))]
    async fn start(&self, spec: &ServiceSpec) -> Result<ServiceHandle, LaunchError> {
        let output = run_shell(&spec.start, self.timeout)
            .await
            .map_err(|source| LaunchError::Shell {
                service: spec.name.clone(),
                source,
            })?;

        if !output.success {
            return Err(LaunchError::Command {
                service: spec.name.clone(),
                reason: output.describe_failure(),
            });
        }

        info!(reference = %spec.start, "Launched");
        Ok(ServiceHandle {
            service: spec.name.clone(),
            reference: spec.start.clone(),
        })
    }
}
