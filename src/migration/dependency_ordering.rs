//! Dependency ordering and validation for seeds
//!
//! This module provides functionality to:
//! - Validate that every declared dependency names a loaded seed
//! - Topologically sort seeds so dependencies run first
//!
//! The sort is stable: among seeds whose dependencies are satisfied, the one that
//! came first in the input runs first. Callers pass seeds alphabetically, so the
//! result is deterministic.

use std::collections::{BTreeSet, HashMap};

/// Seed metadata for dependency ordering
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub name: String,
    pub dependencies: Vec<String>, // Seeds this seed depends on
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            dependencies,
        }
    }
}

/// Validate that all dependencies point to seeds that exist
pub fn validate_references(nodes: &[DependencyNode]) -> Result<(), String> {
    let names: BTreeSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    let mut errors = Vec::new();

    for node in nodes {
        for dep in &node.dependencies {
            if !names.contains(dep.as_str()) {
                errors.push(format!(
                    "Seed '{}' depends on '{}' which does not exist",
                    node.name, dep
                ));
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    Ok(())
}

/// Topologically sort seeds by their dependencies
///
/// Returns names in order: dependencies first, dependents last.
/// Returns an error naming the seeds involved if there's a circular dependency.
pub fn topological_sort(nodes: &[DependencyNode]) -> Result<Vec<String>, String> {
    validate_references(nodes)?;

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.name.as_str(), i))
        .collect();

    // For each seed, track which seeds depend on it
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        let unique: BTreeSet<&str> = node.dependencies.iter().map(String::as_str).collect();
        for dep in unique {
            if let Some(&d) = index.get(dep) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    // Ready set ordered by input position
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut result = Vec::with_capacity(nodes.len());

    while let Some(current) = ready.pop_first() {
        result.push(nodes[current].name.clone());
        for &dependent in &dependents[current] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if result.len() != nodes.len() {
        let cyclic: Vec<&str> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.name.as_str())
            .collect();
        return Err(format!(
            "Circular dependency detected between seeds: {}",
            cyclic.join(", ")
        ));
    }

    Ok(result)
}
