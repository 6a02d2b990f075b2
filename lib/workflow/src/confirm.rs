//! Human-in-the-loop confirmation.
//!
//! When execution reaches a confirm node the run suspends: a confirm record
//! is persisted with an expiry, and the remaining chain is not executed in
//! that call. Resumption is out-of-band — a confirmer decides, and approval
//! re-enqueues the remainder as a new unit of work starting at the node
//! after the confirm.

use crate::error::ConfirmError;
use crate::expression::Scope;
use crate::instance::InstanceStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flywheel_core::{ConfirmId, InstanceId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Status of a pending confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; the remaining chain was re-enqueued.
    Approved,
    /// Denied; the instance was marked failed.
    Denied,
    /// Expired before a decision arrived.
    Expired,
}

/// The decision a confirmer can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmDecision {
    Approved,
    Denied,
}

/// A persisted confirmation pause point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRecord {
    /// Unique identifier.
    pub id: ConfirmId,
    /// The workflow that paused.
    pub workflow_id: WorkflowId,
    /// The instance that paused.
    pub instance_id: InstanceId,
    /// The confirm node itself.
    pub node_id: NodeId,
    /// The node after the confirm; `None` when the confirm was terminal.
    pub resume_node: Option<NodeId>,
    /// Snapshot of the evaluation scope at suspension.
    pub scope: Scope,
    /// Current status.
    pub status: ConfirmStatus,
    /// When the confirmation stops being decidable.
    pub expires_at: DateTime<Utc>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the decision arrived.
    pub decided_at: Option<DateTime<Utc>>,
}

impl ConfirmRecord {
    /// Creates a pending confirmation expiring after `expires_in_hours`.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        instance_id: InstanceId,
        node_id: NodeId,
        resume_node: Option<NodeId>,
        scope: Scope,
        expires_in_hours: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConfirmId::new(),
            workflow_id,
            instance_id,
            node_id,
            resume_node,
            scope,
            status: ConfirmStatus::Pending,
            expires_at: now + Duration::hours(i64::from(expires_in_hours)),
            created_at: now,
            decided_at: None,
        }
    }

    /// Returns true when the confirmation expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Trait for confirm record storage.
#[async_trait]
pub trait ConfirmStore: Send + Sync {
    /// Inserts a new record.
    async fn insert(&self, record: ConfirmRecord) -> Result<ConfirmId, ConfirmError>;

    /// Retrieves a record.
    async fn get(&self, id: ConfirmId) -> Result<ConfirmRecord, ConfirmError>;

    /// Updates a record.
    async fn update(&self, record: ConfirmRecord) -> Result<(), ConfirmError>;
}

/// In-memory confirm store for tests and local development.
#[derive(Default)]
pub struct MemoryConfirmStore {
    records: Mutex<HashMap<ConfirmId, ConfirmRecord>>,
}

impl MemoryConfirmStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfirmStore for MemoryConfirmStore {
    async fn insert(&self, record: ConfirmRecord) -> Result<ConfirmId, ConfirmError> {
        let id = record.id;
        self.records
            .lock()
            .expect("confirm store lock")
            .insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: ConfirmId) -> Result<ConfirmRecord, ConfirmError> {
        self.records
            .lock()
            .expect("confirm store lock")
            .get(&id)
            .cloned()
            .ok_or(ConfirmError::NotFound { id })
    }

    async fn update(&self, record: ConfirmRecord) -> Result<(), ConfirmError> {
        let mut records = self.records.lock().expect("confirm store lock");
        if !records.contains_key(&record.id) {
            return Err(ConfirmError::NotFound { id: record.id });
        }
        records.insert(record.id, record);
        Ok(())
    }
}

/// A re-enqueued remainder of a suspended workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    /// The workflow to resume.
    pub workflow_id: WorkflowId,
    /// The instance the work belongs to.
    pub instance_id: InstanceId,
    /// Where to resume execution.
    pub start_node: NodeId,
    /// The evaluation scope at suspension time.
    pub scope: Scope,
}

/// Trait for enqueueing resumed work.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues a unit of work.
    async fn enqueue(&self, unit: WorkUnit) -> Result<(), ConfirmError>;
}

/// In-memory work queue for tests and local development.
#[derive(Default)]
pub struct MemoryWorkQueue {
    units: Mutex<Vec<WorkUnit>>,
}

impl MemoryWorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains every enqueued unit.
    #[must_use]
    pub fn drain(&self) -> Vec<WorkUnit> {
        std::mem::take(&mut *self.units.lock().expect("work queue lock"))
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, unit: WorkUnit) -> Result<(), ConfirmError> {
        self.units.lock().expect("work queue lock").push(unit);
        Ok(())
    }
}

/// Applies confirm decisions.
pub struct ConfirmManager {
    confirms: Arc<dyn ConfirmStore>,
    instances: Arc<dyn InstanceStore>,
    queue: Arc<dyn WorkQueue>,
}

impl ConfirmManager {
    /// Creates a manager over the given stores.
    #[must_use]
    pub fn new(
        confirms: Arc<dyn ConfirmStore>,
        instances: Arc<dyn InstanceStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            confirms,
            instances,
            queue,
        }
    }

    /// Applies a decision to a pending confirmation.
    ///
    /// Approval re-enqueues the remaining chain (when one exists); denial
    /// marks the suspended instance failed at the confirm node. An expired
    /// confirmation is marked as such and cannot be decided.
    ///
    /// # Errors
    ///
    /// Returns an error when the record is missing, already decided, or
    /// expired, or when bookkeeping fails.
    pub async fn decide(
        &self,
        id: ConfirmId,
        decision: ConfirmDecision,
    ) -> Result<(), ConfirmError> {
        let mut record = self.confirms.get(id).await?;

        if record.status != ConfirmStatus::Pending {
            return Err(ConfirmError::AlreadyDecided { id });
        }
        if record.is_expired(Utc::now()) {
            record.status = ConfirmStatus::Expired;
            self.confirms.update(record).await?;
            return Err(ConfirmError::Expired { id });
        }

        record.decided_at = Some(Utc::now());
        match decision {
            ConfirmDecision::Approved => {
                record.status = ConfirmStatus::Approved;
                self.confirms.update(record.clone()).await?;
                if let Some(resume_node) = record.resume_node {
                    self.queue
                        .enqueue(WorkUnit {
                            workflow_id: record.workflow_id,
                            instance_id: record.instance_id,
                            start_node: resume_node,
                            scope: record.scope,
                        })
                        .await?;
                }
            }
            ConfirmDecision::Denied => {
                record.status = ConfirmStatus::Denied;
                self.confirms.update(record.clone()).await?;
                let mut instance = self.instances.get_instance(record.instance_id).await?;
                instance.fail(record.node_id);
                self.instances.update_instance(instance).await?;
            }
        }

        Ok(())
    }
}
