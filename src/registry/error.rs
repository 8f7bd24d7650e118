//! Error types for registry loading.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-time failures. Any of these aborts a run before a service starts.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or does not match the schema.
    #[error("invalid stack configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two services share a name.
    #[error("service `{0}` is defined more than once")]
    DuplicateService(String),

    /// A service has an empty name.
    #[error("service names must not be empty")]
    EmptyName,

    /// A `{{placeholder}}` does not name a known variable.
    #[error("service `{service}` references unknown variable `{variable}`")]
    UnknownVariable { service: String, variable: String },

    /// A health check is missing the target its protocol needs.
    #[error("service `{service}` has an invalid health check: {reason}")]
    InvalidHealthCheck { service: String, reason: String },
}
