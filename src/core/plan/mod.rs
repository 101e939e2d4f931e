mod dag;
mod step;

pub use step::Step;

use crate::error::PlanError;
use dag::DependencyGraph;

/// An ordered, dependency-annotated collection of steps.
///
/// Construction validates the dependency graph eagerly; a `Plan` that exists
/// is always acyclic, and every dependency resolves to a step declared earlier.
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<Step>,
    graph: DependencyGraph,
    order: Vec<usize>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Result<Self, PlanError> {
        let nodes = steps
            .iter()
            .map(|step| (step.id(), step.dependencies()))
            .collect::<Vec<_>>();
        let graph = DependencyGraph::build(&nodes)?;
        let order = graph.topological_order();

        Ok(Self {
            steps,
            graph,
            order,
        })
    }

    /// Steps in insertion order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id() == id)
    }

    /// Steps in the order the runner visits them.
    pub fn execution_order(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().map(|&index| &self.steps[index])
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn dependency_indices(&self, index: usize) -> &[usize] {
        self.graph.dependencies_of(index)
    }
}
