//! Execution and sample records.
//!
//! A `WorkflowInstance` captures one run of a workflow; an `InstanceNode`
//! captures one concrete execution or test-run of a node. Records are the
//! source of downstream sample data, so partial progress is never discarded:
//! a failed run keeps every record written before the failure.

use crate::error::InstanceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flywheel_core::{InstanceId, InstanceNodeId, NodeId, TriggerId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// The overall state of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// The instance is executing.
    Running,
    /// Every executed node passed and the chain reached a terminal node.
    Passed,
    /// A node failed; the failing node is recorded.
    Failed,
    /// Execution paused at a confirm node awaiting a decision.
    Suspended,
}

/// The result of a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Passed,
    Failed,
}

/// How an instance-node record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Live workflow execution.
    Execution,
    /// A manual "run node" test invocation.
    ManualTest,
    /// A generated (composed) sample.
    Composed,
    /// The node was skipped.
    Skip,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier for this instance.
    pub id: InstanceId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The trigger that initiated this run, if any.
    pub trigger_id: Option<TriggerId>,
    /// Current status.
    pub status: InstanceStatus,
    /// The failing node, when `status` is `Failed`.
    pub failed_node: Option<NodeId>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Creates a running instance.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, trigger_id: Option<TriggerId>) -> Self {
        Self {
            id: InstanceId::new(),
            workflow_id,
            trigger_id,
            status: InstanceStatus::Running,
            failed_node: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Marks the instance as passed.
    pub fn pass(&mut self) {
        self.status = InstanceStatus::Passed;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the instance as failed at the given node.
    pub fn fail(&mut self, node_id: NodeId) {
        self.status = InstanceStatus::Failed;
        self.failed_node = Some(node_id);
        self.finished_at = Some(Utc::now());
    }

    /// Marks the instance as suspended at a confirm node.
    pub fn suspend(&mut self) {
        self.status = InstanceStatus::Suspended;
    }
}

/// One concrete execution or test-run of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceNode {
    /// Unique identifier for this record.
    pub id: InstanceNodeId,
    /// The workflow this record belongs to.
    pub workflow_id: WorkflowId,
    /// The instance this record belongs to; manual tests have none.
    pub instance_id: Option<InstanceId>,
    /// The node that was executed.
    pub node_id: NodeId,
    /// Rendered input the node received.
    pub input: JsonValue,
    /// Output the node produced (or error details on failure).
    pub output: JsonValue,
    /// Whether the node passed.
    pub status: NodeRunStatus,
    /// How this record came to exist.
    pub source: RecordSource,
    /// Foreach iteration index, when executed inside a loop body.
    pub iteration: Option<u32>,
    /// Whether this record is the selected sample for its node.
    pub is_selected_sample: bool,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl InstanceNode {
    /// Creates a record of a live execution.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        instance_id: Option<InstanceId>,
        node_id: NodeId,
        source: RecordSource,
    ) -> Self {
        Self {
            id: InstanceNodeId::new(),
            workflow_id,
            instance_id,
            node_id,
            input: JsonValue::Null,
            output: JsonValue::Null,
            status: NodeRunStatus::Passed,
            source,
            iteration: None,
            is_selected_sample: false,
            created_at: Utc::now(),
        }
    }

    /// Sets the rendered input.
    #[must_use]
    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input = input;
        self
    }

    /// Sets the output.
    #[must_use]
    pub fn with_output(mut self, output: JsonValue) -> Self {
        self.output = output;
        self
    }

    /// Marks the record as failed with error details in the output.
    #[must_use]
    pub fn failed(mut self, error: JsonValue) -> Self {
        self.status = NodeRunStatus::Failed;
        self.output = error;
        self
    }

    /// Sets the foreach iteration index.
    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }
}

/// Trait for instance and record storage.
///
/// Implementations commit an instance together with its node records
/// atomically; a retried write after a failed commit must not observe
/// partial state.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Inserts a new instance.
    async fn insert_instance(&self, instance: WorkflowInstance) -> Result<(), InstanceError>;

    /// Updates an existing instance.
    async fn update_instance(&self, instance: WorkflowInstance) -> Result<(), InstanceError>;

    /// Retrieves an instance.
    async fn get_instance(&self, id: InstanceId) -> Result<WorkflowInstance, InstanceError>;

    /// Inserts a node record.
    async fn record_node(&self, record: InstanceNode) -> Result<InstanceNodeId, InstanceError>;

    /// Lists records for an instance, in insertion order.
    async fn nodes_for_instance(&self, id: InstanceId) -> Result<Vec<InstanceNode>, InstanceError>;

    /// Lists records for a (workflow, node) pair, in insertion order.
    async fn records_for_node(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Vec<InstanceNode>, InstanceError>;

    /// Selects a record as the node's sample.
    ///
    /// Transactionally unselects every other record for the (workflow, node)
    /// pair, then selects the given one: at most one record per pair may be
    /// selected.
    async fn select_sample(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        record_id: InstanceNodeId,
    ) -> Result<(), InstanceError>;
}

/// In-memory instance store for tests and local development.
#[derive(Default)]
pub struct MemoryInstanceStore {
    instances: Mutex<HashMap<InstanceId, WorkflowInstance>>,
    records: Mutex<Vec<InstanceNode>>,
}

impl MemoryInstanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record written so far, in insertion order.
    #[must_use]
    pub fn all_records(&self) -> Vec<InstanceNode> {
        self.records.lock().expect("records lock").clone()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn insert_instance(&self, instance: WorkflowInstance) -> Result<(), InstanceError> {
        self.instances
            .lock()
            .expect("instances lock")
            .insert(instance.id, instance);
        Ok(())
    }

    async fn update_instance(&self, instance: WorkflowInstance) -> Result<(), InstanceError> {
        let mut instances = self.instances.lock().expect("instances lock");
        if !instances.contains_key(&instance.id) {
            return Err(InstanceError::InstanceNotFound { id: instance.id });
        }
        instances.insert(instance.id, instance);
        Ok(())
    }

    async fn get_instance(&self, id: InstanceId) -> Result<WorkflowInstance, InstanceError> {
        self.instances
            .lock()
            .expect("instances lock")
            .get(&id)
            .cloned()
            .ok_or(InstanceError::InstanceNotFound { id })
    }

    async fn record_node(&self, record: InstanceNode) -> Result<InstanceNodeId, InstanceError> {
        let id = record.id;
        self.records.lock().expect("records lock").push(record);
        Ok(id)
    }

    async fn nodes_for_instance(&self, id: InstanceId) -> Result<Vec<InstanceNode>, InstanceError> {
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .iter()
            .filter(|r| r.instance_id == Some(id))
            .cloned()
            .collect())
    }

    async fn records_for_node(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Vec<InstanceNode>, InstanceError> {
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .iter()
            .filter(|r| r.workflow_id == workflow_id && r.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn select_sample(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        record_id: InstanceNodeId,
    ) -> Result<(), InstanceError> {
        let mut records = self.records.lock().expect("records lock");
        if !records.iter().any(|r| r.id == record_id) {
            return Err(InstanceError::RecordNotFound { id: record_id });
        }
        // Unselect-all, then select-one, in a single critical section.
        for record in records.iter_mut() {
            if record.workflow_id == workflow_id && record.node_id == node_id {
                record.is_selected_sample = record.id == record_id;
            }
        }
        Ok(())
    }
}
