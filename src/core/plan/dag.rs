use crate::error::PlanError;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Dependency graph over step indices.
///
/// Edges point from a dependency to its dependents. Indices are the steps'
/// insertion positions, so ordered sets of indices break ties by insertion
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DependencyGraph {
    ids: Vec<String>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Validates ids and edges, then rejects cycles and dependencies on steps
    /// declared later.
    pub(crate) fn build(nodes: &[(&str, &[String])]) -> Result<Self, PlanError> {
        let index = validate_nodes(nodes)?;
        let dependencies = validate_edges(nodes, &index)?;

        let mut dependents = vec![Vec::new(); nodes.len()];
        for (node, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let graph = Self {
            ids: nodes.iter().map(|(id, _)| (*id).to_string()).collect(),
            dependencies,
            dependents,
        };
        graph.validate_cycle_free()?;
        graph.validate_declared_before()?;
        Ok(graph)
    }

    pub(crate) fn dependencies_of(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    /// Kahn's algorithm; among ready nodes the earliest inserted goes first.
    pub(crate) fn topological_order(&self) -> Vec<usize> {
        let mut in_degree = self
            .dependencies
            .iter()
            .map(Vec::len)
            .collect::<Vec<_>>();

        let mut queue = in_degree
            .iter()
            .enumerate()
            .filter_map(|(node, degree)| (*degree == 0).then_some(node))
            .collect::<BTreeSet<_>>();

        let mut sorted = Vec::with_capacity(self.ids.len());
        while let Some(node) = queue.pop_first() {
            sorted.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.insert(dependent);
                }
            }
        }

        sorted
    }

    fn validate_cycle_free(&self) -> Result<(), PlanError> {
        let mut states = vec![None; self.ids.len()];
        let mut stack = Vec::new();

        for node in 0..self.ids.len() {
            if states[node].is_some() {
                continue;
            }

            if let Some(path) = self.detect_cycle(node, &mut states, &mut stack) {
                return Err(PlanError::Cycle(
                    path.into_iter().map(|n| self.ids[n].clone()).collect(),
                ));
            }
        }

        Ok(())
    }

    fn validate_declared_before(&self) -> Result<(), PlanError> {
        for (node, deps) in self.dependencies.iter().enumerate() {
            if let Some(&later) = deps.iter().find(|&&dep| dep > node) {
                return Err(PlanError::ForwardDependency {
                    step: self.ids[node].clone(),
                    dependency: self.ids[later].clone(),
                });
            }
        }
        Ok(())
    }

    fn detect_cycle(
        &self,
        node: usize,
        states: &mut [Option<NodeState>],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        states[node] = Some(NodeState::Visiting);
        stack.push(node);

        for &next in &self.dependents[node] {
            match states[next] {
                Some(NodeState::Visiting) => {
                    let start = stack.iter().position(|&entry| entry == next)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Some(NodeState::Visited) => {}
                None => {
                    if let Some(path) = self.detect_cycle(next, states, stack) {
                        return Some(path);
                    }
                }
            }
        }

        stack.pop();
        states[node] = Some(NodeState::Visited);
        None
    }
}

fn validate_nodes<'a>(nodes: &[(&'a str, &[String])]) -> Result<HashMap<&'a str, usize>, PlanError> {
    let mut index = HashMap::with_capacity(nodes.len());

    for (position, (id, _)) in nodes.iter().enumerate() {
        if id.trim().is_empty() {
            return Err(PlanError::EmptyId);
        }

        if index.insert(*id, position).is_some() {
            return Err(PlanError::DuplicateId((*id).to_string()));
        }
    }

    Ok(index)
}

fn validate_edges(
    nodes: &[(&str, &[String])],
    index: &HashMap<&str, usize>,
) -> Result<Vec<Vec<usize>>, PlanError> {
    let mut dependencies = Vec::with_capacity(nodes.len());

    for (id, requires) in nodes {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(requires.len());

        for dependency in *requires {
            let Some(&target) = index.get(dependency.as_str()) else {
                let known = nodes
                    .iter()
                    .map(|(id, _)| *id)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(PlanError::UnknownDependency {
                    step: (*id).to_string(),
                    dependency: dependency.clone(),
                    known,
                });
            };

            if !seen.insert(target) {
                return Err(PlanError::DuplicateDependency {
                    step: (*id).to_string(),
                    dependency: dependency.clone(),
                });
            }

            resolved.push(target);
        }

        dependencies.push(resolved);
    }

    Ok(dependencies)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Visiting,
    Visited,
}
