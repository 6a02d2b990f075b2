//! Trigger model and storage boundary.
//!
//! A trigger is one-to-one with its workflow's start node. It is created
//! when a start node is assigned, provisioned on disabled→enabled, torn down
//! (but not deleted) on enabled→disabled, and deleted only with the start
//! node itself. The `data` map holds opaque external-resource identifiers
//! and is fully replaced by whatever the provider returns on enable.

use crate::error::TriggerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flywheel_core::{NodeId, TriggerId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Mutex;

/// The kind of trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Registered callback on a third-party API.
    Webhook,
    /// Job on the external scheduler.
    Cron,
    /// Periodic polling subscription.
    Poll,
}

/// Explicit trigger state machine: {Disabled} ⇄ {Enabled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    /// External resources torn down (or never provisioned).
    #[default]
    Disabled,
    /// External resources provisioned.
    Enabled,
}

impl TriggerStatus {
    /// Returns true for a valid state change; same-state transitions are
    /// no-ops handled idempotently by the registry, not state changes.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self != next
    }
}

/// A trigger bound to a workflow's start node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier; also keys the external scheduler job.
    pub id: TriggerId,
    /// The owning workflow.
    pub workflow_id: WorkflowId,
    /// The start node this trigger activates.
    pub node_id: NodeId,
    /// Trigger kind.
    pub kind: TriggerKind,
    /// Current status.
    pub status: TriggerStatus,
    /// Opaque external-resource identifiers returned by the provider.
    pub data: Map<String, JsonValue>,
    /// Provider correlation ID, when one was issued.
    pub query_id: Option<String>,
    /// When the trigger was created.
    pub created_at: DateTime<Utc>,
    /// When the trigger was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Trigger {
    /// Creates a disabled trigger for a start node.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, node_id: NodeId, kind: TriggerKind) -> Self {
        let now = Utc::now();
        Self {
            id: TriggerId::new(),
            workflow_id,
            node_id,
            kind,
            status: TriggerStatus::Disabled,
            data: Map::new(),
            query_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the trigger as updated.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Trait for trigger storage.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Inserts a trigger.
    async fn insert(&self, trigger: Trigger) -> Result<TriggerId, TriggerError>;

    /// Retrieves a trigger.
    async fn get(&self, id: TriggerId) -> Result<Trigger, TriggerError>;

    /// Updates a trigger.
    async fn update(&self, trigger: Trigger) -> Result<(), TriggerError>;

    /// Deletes a trigger.
    async fn delete(&self, id: TriggerId) -> Result<(), TriggerError>;

    /// Finds the trigger for a workflow, if one exists.
    async fn find_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<Trigger>, TriggerError>;
}

/// In-memory trigger store for tests and local development.
#[derive(Default)]
pub struct MemoryTriggerStore {
    triggers: Mutex<HashMap<TriggerId, Trigger>>,
}

impl MemoryTriggerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerStore for MemoryTriggerStore {
    async fn insert(&self, trigger: Trigger) -> Result<TriggerId, TriggerError> {
        let id = trigger.id;
        self.triggers
            .lock()
            .expect("trigger store lock")
            .insert(id, trigger);
        Ok(id)
    }

    async fn get(&self, id: TriggerId) -> Result<Trigger, TriggerError> {
        self.triggers
            .lock()
            .expect("trigger store lock")
            .get(&id)
            .cloned()
            .ok_or(TriggerError::NotFound { id })
    }

    async fn update(&self, trigger: Trigger) -> Result<(), TriggerError> {
        let mut triggers = self.triggers.lock().expect("trigger store lock");
        if !triggers.contains_key(&trigger.id) {
            return Err(TriggerError::NotFound { id: trigger.id });
        }
        triggers.insert(trigger.id, trigger);
        Ok(())
    }

    async fn delete(&self, id: TriggerId) -> Result<(), TriggerError> {
        self.triggers
            .lock()
            .expect("trigger store lock")
            .remove(&id);
        Ok(())
    }

    async fn find_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Option<Trigger>, TriggerError> {
        Ok(self
            .triggers
            .lock()
            .expect("trigger store lock")
            .values()
            .find(|t| t.workflow_id == workflow_id)
            .cloned())
    }
}
