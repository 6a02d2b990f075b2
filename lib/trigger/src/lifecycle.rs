//! Workflow enable/disable orchestration.
//!
//! Enabling a workflow runs the activation readiness check (every reachable
//! non-switch node tested or skipped, behind the feature gate) and then
//! provisions the trigger; disabling tears the trigger down but keeps it.
//! Deleting the start node removes the trigger entirely.

use crate::error::LifecycleError;
use crate::registry::TriggerRegistry;
use flywheel_core::TriggerId;
use flywheel_workflow::{FeatureGate, GraphError, Workflow, ensure_activatable};
use std::sync::Arc;

/// Orchestrates workflow-level enable/disable against the trigger registry.
pub struct WorkflowLifecycle {
    registry: Arc<TriggerRegistry>,
    gate: Arc<dyn FeatureGate>,
    walk_budget: usize,
}

impl WorkflowLifecycle {
    /// Creates a lifecycle orchestrator.
    ///
    /// `walk_budget` bounds graph walks during the readiness check; the
    /// engine's step budget is the natural value.
    #[must_use]
    pub fn new(
        registry: Arc<TriggerRegistry>,
        gate: Arc<dyn FeatureGate>,
        walk_budget: usize,
    ) -> Self {
        Self {
            registry,
            gate,
            walk_budget,
        }
    }

    /// Enables a workflow: readiness check, then trigger provisioning.
    ///
    /// # Errors
    ///
    /// Returns the retryable not-tested error when reachable nodes still
    /// need testing, or a trigger error when provisioning fails; the
    /// workflow stays disabled in both cases.
    pub async fn enable_workflow(
        &self,
        workflow: &mut Workflow,
        trigger_id: TriggerId,
    ) -> Result<(), LifecycleError> {
        let start = workflow
            .graph
            .start_node()
            .ok_or(GraphError::StartNotSet)?;
        ensure_activatable(&workflow.graph, start, self.gate.as_ref(), self.walk_budget)?;

        let node = workflow
            .graph
            .get_node(start)
            .ok_or(GraphError::NodeNotFound { node_id: start })?
            .clone();
        self.registry.enable(trigger_id, &node).await?;

        workflow.enable();
        Ok(())
    }

    /// Disables a workflow, tearing down (but keeping) its trigger.
    ///
    /// # Errors
    ///
    /// Returns an error when teardown fails; teardown is idempotent, so a
    /// retry after a partial failure succeeds.
    pub async fn disable_workflow(
        &self,
        workflow: &mut Workflow,
        trigger_id: TriggerId,
    ) -> Result<(), LifecycleError> {
        let start = workflow
            .graph
            .start_node()
            .ok_or(GraphError::StartNotSet)?;
        let node = workflow
            .graph
            .get_node(start)
            .ok_or(GraphError::NodeNotFound { node_id: start })?
            .clone();
        self.registry.disable(trigger_id, &node).await?;

        workflow.disable();
        Ok(())
    }

    /// Deletes the workflow's start node, removing its trigger with it.
    ///
    /// # Errors
    ///
    /// Returns an error when teardown, deletion, or the graph splice fails.
    pub async fn remove_start_node(
        &self,
        workflow: &mut Workflow,
        trigger_id: TriggerId,
    ) -> Result<(), LifecycleError> {
        let start = workflow
            .graph
            .start_node()
            .ok_or(GraphError::StartNotSet)?;
        let node = workflow
            .graph
            .get_node(start)
            .ok_or(GraphError::NodeNotFound { node_id: start })?
            .clone();

        self.registry.remove(trigger_id, &node).await?;
        workflow.graph.remove_node(start)?;
        workflow.touch();
        Ok(())
    }
}
