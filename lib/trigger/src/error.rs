//! Error types for the trigger crate.
//!
//! The taxonomy separates configuration errors (rejected before any external
//! call), credential errors, external-system errors, and storage failures:
//! - `CronError`: Malformed schedule shorthands
//! - `SchedulerError`: Job-scheduler protocol failures
//! - `ProviderError`: Webhook/poll provider failures
//! - `TriggerError`: Registry operations (wraps the above)
//! - `LifecycleError`: Workflow enable/disable orchestration

use flywheel_auth::AuthError;
use flywheel_core::{NodeId, TriggerId};
use flywheel_workflow::{GraphError, WorkflowError};
use std::fmt;

/// Errors from cron shorthand parsing and derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    /// A time-of-day string is not strict `HH:MM:SS`.
    InvalidTimeOfDay { value: String, reason: String },
    /// A schedule component is out of range.
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
    /// A raw cron expression is malformed.
    InvalidExpression { expression: String, reason: String },
    /// No schedule shorthand was configured.
    MissingSchedule,
    /// More than one schedule shorthand was configured.
    AmbiguousSchedule,
    /// The trigger configuration failed to decode.
    InvalidConfig { reason: String },
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeOfDay { value, reason } => {
                write!(f, "invalid time of day '{value}': {reason}")
            }
            Self::OutOfRange { field, value, max } => {
                write!(f, "{field} {value} out of range (max {max})")
            }
            Self::InvalidExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::MissingSchedule => write!(f, "no schedule configured"),
            Self::AmbiguousSchedule => {
                write!(f, "more than one schedule shorthand configured")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid trigger configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for CronError {}

/// Errors from the external job scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler could not be reached.
    Unreachable { reason: String },
    /// The scheduler rejected the request.
    Rejected { status: u16, body: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { reason } => {
                write!(f, "scheduler unreachable: {reason}")
            }
            Self::Rejected { status, body } => {
                write!(f, "scheduler rejected request with status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Errors from webhook/poll providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The remote API rejected the credential. Non-fatal when enabling a
    /// webhook trigger: retrying with a repaired credential is expected to
    /// succeed.
    TokenUnauthorized,
    /// The remote resource no longer exists; teardown treats this as done.
    ResourceMissing,
    /// The provider configuration failed to bind.
    InvalidConfig { reason: String },
    /// No provider is registered for the class.
    NotRegistered { class: String },
    /// The remote registration call failed.
    External { reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenUnauthorized => write!(f, "credential rejected by remote API"),
            Self::ResourceMissing => write!(f, "remote resource already absent"),
            Self::InvalidConfig { reason } => {
                write!(f, "invalid provider configuration: {reason}")
            }
            Self::NotRegistered { class } => {
                write!(f, "no provider registered for class '{class}'")
            }
            Self::External { reason } => write!(f, "provider call failed: {reason}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from trigger registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// Trigger not found.
    NotFound { id: TriggerId },
    /// The node requires a credential but none is referenced.
    CredentialRequired { node_id: NodeId },
    /// Schedule configuration error.
    Cron(CronError),
    /// Scheduler protocol error.
    Scheduler(SchedulerError),
    /// Provider error.
    Provider(ProviderError),
    /// Authorizer error.
    Auth(AuthError),
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "trigger not found: {id}"),
            Self::CredentialRequired { node_id } => {
                write!(f, "node {node_id} requires a credential")
            }
            Self::Cron(e) => write!(f, "cron error: {e}"),
            Self::Scheduler(e) => write!(f, "scheduler error: {e}"),
            Self::Provider(e) => write!(f, "provider error: {e}"),
            Self::Auth(e) => write!(f, "auth error: {e}"),
            Self::StorageFailed { reason } => {
                write!(f, "trigger storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for TriggerError {}

impl From<CronError> for TriggerError {
    fn from(e: CronError) -> Self {
        Self::Cron(e)
    }
}

impl From<SchedulerError> for TriggerError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

impl From<ProviderError> for TriggerError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

impl From<AuthError> for TriggerError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

/// Errors from workflow lifecycle orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Workflow-level failure (including the retryable not-tested error).
    Workflow(WorkflowError),
    /// Graph failure (e.g. no start node assigned).
    Graph(GraphError),
    /// Trigger registry failure.
    Trigger(TriggerError),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow(e) => write!(f, "workflow error: {e}"),
            Self::Graph(e) => write!(f, "graph error: {e}"),
            Self::Trigger(e) => write!(f, "trigger error: {e}"),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<WorkflowError> for LifecycleError {
    fn from(e: WorkflowError) -> Self {
        Self::Workflow(e)
    }
}

impl From<GraphError> for LifecycleError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<TriggerError> for LifecycleError {
    fn from(e: TriggerError) -> Self {
        Self::Trigger(e)
    }
}
