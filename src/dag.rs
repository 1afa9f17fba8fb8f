//! Checkpoint graph checks.
//!
//! Edges run from a dependency to its dependents. A scenario is well formed when
//! the success id and every `depends_on` entry name a declared checkpoint and the
//! graph is acyclic.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::{error::ScenarioError, scenario::Scenario};

/// Rejects scenarios whose checkpoint graph cannot be executed.
///
/// Checks run in a fixed order: success id, dangling dependencies, then cycles
/// (Kahn's algorithm, counting how many checkpoints can be peeled off at in-degree zero).
pub fn validate_dag(scenario: &Scenario) -> Result<(), ScenarioError> {
    let ids: HashSet<&str> = scenario.checkpoints.iter().map(|cp| cp.id.as_str()).collect();

    if !ids.contains(scenario.success.as_str()) {
        return Err(ScenarioError::UnknownSuccessCheckpoint {
            success: scenario.success.clone(),
        });
    }

    for cp in &scenario.checkpoints {
        if let Some(missing) = cp.depends_on.iter().find(|dep| !ids.contains(dep.as_str())) {
            return Err(ScenarioError::DanglingDependency {
                checkpoint: cp.id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for cp in &scenario.checkpoints {
        in_degree.entry(cp.id.as_str()).or_insert(0);
        dependents.entry(cp.id.as_str()).or_default();
    }
    for cp in &scenario.checkpoints {
        for dep in &cp.depends_on {
            dependents.entry(dep.as_str()).or_default().push(cp.id.as_str());
            *in_degree.entry(cp.id.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = scenario
        .checkpoints
        .iter()
        .map(|cp| cp.id.as_str())
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .collect();
    let mut removed: HashSet<&str> = HashSet::new();

    while let Some(node) = queue.pop_front() {
        if !removed.insert(node) {
            continue;
        }
        for &next in dependents.get(node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if removed.len() < ids.len() {
        return Err(ScenarioError::CyclicDependency {
            visited: removed.len(),
            total: ids.len(),
        });
    }

    Ok(())
}

/// Unreached checkpoints split by whether their dependencies are all met.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockingInfo {
    pub blocked: Vec<String>,
    pub unblocked: Vec<String>,
}

pub fn blocking_info<S: AsRef<str>>(scenario: &Scenario, reached: &[S]) -> BlockingInfo {
    let reached: HashSet<&str> = reached.iter().map(AsRef::as_ref).collect();
    let mut info = BlockingInfo::default();

    for cp in &scenario.checkpoints {
        if reached.contains(cp.id.as_str()) {
            continue;
        }
        if cp.depends_on.iter().any(|dep| !reached.contains(dep.as_str())) {
            info.blocked.push(cp.id.clone());
        } else {
            info.unblocked.push(cp.id.clone());
        }
    }

    info
}
