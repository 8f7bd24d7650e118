//! Error types for dependency resolution.

use thiserror::Error;

/// The registry does not describe a valid bring-up order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A service depends on a name the registry does not define.
    #[error("service `{service}` depends on unknown service `{dependency}`")]
    UnknownDependency { service: String, dependency: String },

    /// The depends-on relation loops; `services` lists the loop in order.
    #[error("dependency cycle: {}", cycle_path(.services))]
    Cycle { services: Vec<String> },
}

fn cycle_path(services: &[String]) -> String {
    let mut path = services.join(" -> ");
    if let Some(first) = services.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}
