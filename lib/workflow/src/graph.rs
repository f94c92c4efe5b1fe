//! Resolution and validation of a workflow's edges into concrete operation indices.
//!
//! This module owns the *static* shape of the graph: which operation points at
//! which, and whether that shape is even legal (no cycles, every endpoint
//! resolves). The *dynamic* bookkeeping that changes as operations finish
//! (`blocked_by` counters, `reached`/`skipped` flags, the ready queue) lives in
//! [`crate::workflow`], next to the dispatch loop it drives — the split mirrors the
//! sibling `graph.rs`/`remaining_work.rs` pair in this codebase's other workflow
//! implementation, which separates graph *validation* from run-time *readiness*
//! tracking the same way.

use crate::descriptor::{DependencyDescriptor, Endpoint, SegueDescriptor, SeguePredicate};
use crate::error::ValidationError;
use crate::operation::Operation;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved, indexed segue edge: `source` becomes `target`'s predecessor only if
/// `predicate` (or the always-true default) is satisfied by `source`'s result.
#[derive(Clone)]
pub(crate) struct SegueEdge {
    pub source: usize,
    pub target: usize,
    pub predicate: Option<SeguePredicate>,
}

/// The resolved, validated shape of a workflow's graph: operation indices and the
/// dependency/segue edges between them.
pub(crate) struct OperationGraph {
    pub op_count: usize,
    pub dependencies: Vec<(usize, usize)>,
    pub segues: Vec<SegueEdge>,
}

impl OperationGraph {
    /// Resolves every descriptor's endpoints against `operations`/`name_index`, then
    /// validates the resulting shape (cycles). Does not compute dynamic readiness —
    /// see [`crate::workflow::ReadinessState`] for that.
    pub(crate) fn build(
        operations: &[Arc<dyn Operation>],
        name_index: &HashMap<String, usize>,
        dependency_descriptors: &[DependencyDescriptor],
        segue_descriptors: &[SegueDescriptor],
    ) -> Result<Self, ValidationError> {
        let mut dependencies = Vec::with_capacity(dependency_descriptors.len());
        for d in dependency_descriptors {
            let source = resolve_endpoint(&d.connection.source, operations, name_index)
                .ok_or_else(|| ValidationError::InvalidDependency {
                    detail: "source endpoint did not resolve".to_string(),
                })?;
            let target = resolve_endpoint(&d.connection.target, operations, name_index)
                .ok_or_else(|| ValidationError::InvalidDependency {
                    detail: "target endpoint did not resolve".to_string(),
                })?;
            dependencies.push((source, target));
        }

        let mut segues = Vec::with_capacity(segue_descriptors.len());
        for s in segue_descriptors {
            let source = resolve_endpoint(&s.connection.source, operations, name_index)
                .ok_or_else(|| ValidationError::InvalidSegue {
                    detail: "source endpoint did not resolve".to_string(),
                })?;
            let target = resolve_endpoint(&s.connection.target, operations, name_index)
                .ok_or_else(|| ValidationError::InvalidSegue {
                    detail: "target endpoint did not resolve".to_string(),
                })?;
            segues.push(SegueEdge { source, target, predicate: s.predicate.clone() });
        }

        let graph = Self { op_count: operations.len(), dependencies, segues };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Cycle detection over the union of dependency and segue edges. Conditional
    /// segues participate too: the declared intent of any edge, satisfied or not, is
    /// ordering, so a cycle through a segue is still a cycle.
    fn check_acyclic(&self) -> Result<(), ValidationError> {
        let mut g = DiGraph::<(), ()>::with_capacity(self.op_count, self.dependencies.len() + self.segues.len());
        let nodes: Vec<_> = (0..self.op_count).map(|_| g.add_node(())).collect();
        for &(source, target) in &self.dependencies {
            g.add_edge(nodes[source], nodes[target], ());
        }
        for edge in &self.segues {
            g.add_edge(nodes[edge.source], nodes[edge.target], ());
        }
        if petgraph::algo::is_cyclic_directed(&g) {
            Err(ValidationError::DependencyCycle)
        } else {
            Ok(())
        }
    }

    /// Outgoing dependency targets of `op`.
    pub(crate) fn dependency_targets(&self, op: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependencies.iter().filter(move |&&(s, _)| s == op).map(|&(_, t)| t)
    }

    /// Indices into `segues` of edges outgoing from `op`.
    pub(crate) fn outgoing_segue_indices(&self, op: usize) -> impl Iterator<Item = usize> + '_ {
        self.segues.iter().enumerate().filter(move |(_, e)| e.source == op).map(|(i, _)| i)
    }

    /// Indices into `segues` of edges incoming to `op`.
    pub(crate) fn incoming_segue_indices(&self, op: usize) -> impl Iterator<Item = usize> + '_ {
        self.segues.iter().enumerate().filter(move |(_, e)| e.target == op).map(|(i, _)| i)
    }

    pub(crate) fn incoming_dependency_count(&self, op: usize) -> usize {
        self.dependencies.iter().filter(|&&(_, t)| t == op).count()
    }
}

fn resolve_endpoint(
    endpoint: &Endpoint,
    operations: &[Arc<dyn Operation>],
    name_index: &HashMap<String, usize>,
) -> Option<usize> {
    if let Some(op) = &endpoint.operation {
        return operations.iter().position(|candidate| Arc::ptr_eq(candidate, op));
    }
    let name = endpoint.name.as_ref()?;
    name_index.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DependencyDescriptor;
    use crate::operation::BlockOperation;
    use crate::result::OperationResult;

    fn op(name: &str) -> Arc<dyn Operation> {
        let owned = name.to_string();
        Arc::new(BlockOperation::new(Some(owned), false, |_ctx| async {
            OperationResult::success_empty()
        }))
    }

    fn name_index(operations: &[Arc<dyn Operation>]) -> HashMap<String, usize> {
        operations
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.name().map(|n| (n.to_string(), i)))
            .collect()
    }

    #[test]
    fn resolves_dependency_by_name() {
        let operations = vec![op("a"), op("b")];
        let index = name_index(&operations);
        let deps = vec![DependencyDescriptor::between_names("a", "b")];
        let graph = OperationGraph::build(&operations, &index, &deps, &[]).expect("builds");
        assert_eq!(graph.dependencies, vec![(0, 1)]);
    }

    #[test]
    fn unresolvable_name_is_invalid_dependency() {
        let operations = vec![op("a")];
        let index = name_index(&operations);
        let deps = vec![DependencyDescriptor::between_names("a", "missing")];
        let err = OperationGraph::build(&operations, &index, &deps, &[]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDependency { .. }));
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let operations = vec![op("a"), op("b")];
        let index = name_index(&operations);
        let deps = vec![
            DependencyDescriptor::between_names("a", "b"),
            DependencyDescriptor::between_names("b", "a"),
        ];
        let err = OperationGraph::build(&operations, &index, &deps, &[]).unwrap_err();
        assert_eq!(err, ValidationError::DependencyCycle);
    }

    #[test]
    fn object_endpoint_wins_over_stale_name() {
        let a = op("a");
        let b = op("b");
        let operations = vec![Arc::clone(&a), Arc::clone(&b)];
        let index = name_index(&operations);
        let deps = vec![DependencyDescriptor::between_objects(Arc::clone(&a), Arc::clone(&b))];
        let graph = OperationGraph::build(&operations, &index, &deps, &[]).expect("builds");
        assert_eq!(graph.dependencies, vec![(0, 1)]);
    }

    #[test]
    fn dependency_targets_and_incoming_counts() {
        let operations = vec![op("a"), op("b"), op("c")];
        let index = name_index(&operations);
        let deps = vec![
            DependencyDescriptor::between_names("a", "b"),
            DependencyDescriptor::between_names("a", "c"),
        ];
        let graph = OperationGraph::build(&operations, &index, &deps, &[]).expect("builds");
        let targets: Vec<_> = graph.dependency_targets(0).collect();
        assert_eq!(targets, vec![1, 2]);
        assert_eq!(graph.incoming_dependency_count(1), 1);
        assert_eq!(graph.incoming_dependency_count(0), 0);
    }
}
