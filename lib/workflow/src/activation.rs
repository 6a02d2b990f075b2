//! Activation readiness: the node-testing gate.
//!
//! A workflow may only be enabled once every node reachable from its start
//! node — excluding pure switch routers — has passed testing or been
//! explicitly skipped by the user. The check walks the graph, collects the
//! needful set, and subtracts nodes already passing. It is gated by a
//! runtime feature flag owned by an external collaborator.

use crate::error::WorkflowError;
use crate::graph::WorkflowGraph;
use crate::node::NodeKind;
use flywheel_core::NodeId;
use std::collections::HashSet;

/// The feature flag gating the activation readiness check.
pub const NODE_TESTING_GATE: &str = "workflow_node_testing";

/// Runtime feature flag collaborator.
pub trait FeatureGate: Send + Sync {
    /// Returns true when the named flag is enabled.
    fn is_enabled(&self, flag: &str) -> bool;
}

/// Fixed-set feature gate for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureGate {
    enabled: HashSet<String>,
}

impl StaticFeatureGate {
    /// Creates a gate with every flag off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables a flag.
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.enabled.insert(flag.into());
        self
    }
}

impl FeatureGate for StaticFeatureGate {
    fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }
}

/// Returns the reachable non-switch nodes that have not passed testing.
///
/// # Errors
///
/// Returns an error when the start node is missing or the walk exceeds the
/// budget.
pub fn untested_nodes(
    graph: &WorkflowGraph,
    start: NodeId,
    budget: usize,
) -> Result<Vec<NodeId>, WorkflowError> {
    let reachable = graph.reachable_from(start, budget)?;
    Ok(reachable
        .into_iter()
        .filter(|node_id| {
            graph.get_node(*node_id).is_some_and(|node| {
                node.kind() != NodeKind::Switch && !node.testing_status.is_passing()
            })
        })
        .collect())
}

/// Checks whether the workflow may be activated.
///
/// When the gate is off the check passes vacuously.
///
/// # Errors
///
/// Returns [`WorkflowError::NodesNotTested`] naming the blocking nodes; the
/// caller may retry after the nodes are tested or skipped.
pub fn ensure_activatable(
    graph: &WorkflowGraph,
    start: NodeId,
    gate: &dyn FeatureGate,
    budget: usize,
) -> Result<(), WorkflowError> {
    if !gate.is_enabled(NODE_TESTING_GATE) {
        return Ok(());
    }
    let nodes = untested_nodes(graph, start, budget)?;
    if nodes.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::NodesNotTested { nodes })
    }
}
