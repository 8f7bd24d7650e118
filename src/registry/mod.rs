//! # Service Spec Registry
//!
//! The static table of [`ServiceSpec`]s a run works from. It is built once,
//! from a TOML file ([`Registry::load`]) or from specs assembled in code
//! ([`Registry::from_specs`]), and is read-only afterwards; the controller
//! shares it between service tasks behind an `Arc`.
//!
//! Loading validates what can be checked on the table alone (unique,
//! non-empty names, well-formed health checks, known `{{placeholders}}`).
//! Graph-level validation (unknown dependencies, cycles) belongs to
//! [`DependencyGraph::resolve`](crate::graph::DependencyGraph::resolve).

mod config;
pub mod error;

pub use error::*;

use crate::model::ServiceSpec;
use config::StackFile;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Registry {
    name: String,
    services: Vec<ServiceSpec>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Builds a registry from specs, keeping their declaration order.
    pub fn from_specs(
        name: impl Into<String>,
        services: Vec<ServiceSpec>,
    ) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(services.len());
        for (position, spec) in services.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if index.insert(spec.name.clone(), position).is_some() {
                return Err(RegistryError::DuplicateService(spec.name.clone()));
            }
        }
        Ok(Self {
            name: name.into(),
            services,
            index,
        })
    }

    /// Parses a stack definition from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, RegistryError> {
        let file: StackFile = toml::from_str(raw)?;
        let name = file.stack_name();
        let specs = file.into_specs()?;
        debug!(stack = %name, services = specs.len(), "Parsed stack definition");
        Self::from_specs(name, specs)
    }

    /// Reads and parses a stack definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), stack = %registry.name, services = registry.len(), "Loaded registry");
        Ok(registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.index.get(name).map(|&position| &self.services[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Specs in declaration order.
    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
