//! # Dependency Graph Resolver
//!
//! Turns the registry's depends-on relation into a bring-up plan.
//!
//! The plan is *layered*: every service sits at its dependency depth
//! (`0` with no dependencies, otherwise one more than its deepest
//! dependency). Services within a layer never depend on each other, so the
//! controller is free to start them concurrently; the layers themselves are
//! only a reporting aid since each service task waits on its own
//! dependencies.
//!
//! Resolution is a depth-first traversal that marks a node *visiting* while
//! its dependencies are explored. Reaching a visiting node again means the
//! current traversal stack contains a cycle.

pub mod error;

pub use error::*;

use crate::registry::Registry;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
enum Mark {
    Visiting,
    Done(usize),
}

/// A validated, acyclic dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    layers: Vec<BTreeSet<String>>,
    depth: HashMap<String, usize>,
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Validates the registry and computes its layers.
    ///
    /// Every dependency name is checked before any cycle detection, so a
    /// registry with both problems reports the unknown dependency.
    pub fn resolve(registry: &Registry) -> Result<Self, GraphError> {
        for spec in registry.services() {
            for dependency in spec.dependency_names() {
                if !registry.contains(dependency) {
                    return Err(GraphError::UnknownDependency {
                        service: spec.name.clone(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(registry.len());
        let mut stack = Vec::new();
        for spec in registry.services() {
            visit(&spec.name, registry, &mut marks, &mut stack)?;
        }

        let mut layers: Vec<BTreeSet<String>> = Vec::new();
        let mut depth = HashMap::with_capacity(marks.len());
        let mut dependents: HashMap<String, BTreeSet<String>> = HashMap::new();
        for spec in registry.services() {
            let Some(Mark::Done(level)) = marks.get(spec.name.as_str()).copied() else {
                continue;
            };
            if layers.len() <= level {
                layers.resize_with(level + 1, BTreeSet::new);
            }
            layers[level].insert(spec.name.clone());
            depth.insert(spec.name.clone(), level);
            for dependency in spec.dependency_names() {
                dependents
                    .entry(dependency.to_string())
                    .or_default()
                    .insert(spec.name.clone());
            }
        }

        debug!(services = depth.len(), layers = layers.len(), "Resolved dependency graph");
        Ok(Self {
            layers,
            depth,
            dependents,
        })
    }

    /// Services grouped by dependency depth; members of one layer are independent.
    pub fn layers(&self) -> &[BTreeSet<String>] {
        &self.layers
    }

    /// A flat bring-up order: every service appears after all of its dependencies.
    pub fn order(&self) -> Vec<&str> {
        self.layers
            .iter()
            .flat_map(|layer| layer.iter().map(String::as_str))
            .collect()
    }

    pub fn depth_of(&self, service: &str) -> Option<usize> {
        self.depth.get(service).copied()
    }

    /// Every service that directly or transitively depends on `service`.
    pub fn dependents_of(&self, service: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue = vec![service];
        while let Some(current) = queue.pop() {
            if let Some(direct) = self.dependents.get(current) {
                for dependent in direct {
                    if found.insert(dependent.clone()) {
                        queue.push(dependent);
                    }
                }
            }
        }
        found
    }
}

fn visit<'a>(
    name: &'a str,
    registry: &'a Registry,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Result<usize, GraphError> {
    match marks.get(name) {
        Some(Mark::Done(depth)) => return Ok(*depth),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|entry| *entry == name).unwrap_or(0);
            return Err(GraphError::Cycle {
                services: stack[start..].iter().map(|s| s.to_string()).collect(),
            });
        }
        None => {}
    }

    let Some(spec) = registry.get(name) else {
        // Unreachable after the up-front name check in `resolve`.
        return Err(GraphError::UnknownDependency {
            service: stack.last().map(|s| s.to_string()).unwrap_or_default(),
            dependency: name.to_string(),
        });
    };

    marks.insert(name, Mark::Visiting);
    stack.push(name);
    let mut depth = 0;
    for dependency in spec.dependency_names() {
        depth = depth.max(visit(dependency, registry, marks, stack)? + 1);
    }
    stack.pop();
    marks.insert(name, Mark::Done(depth));
    Ok(depth)
}
