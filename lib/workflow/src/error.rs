//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Graph mutation and traversal failures
//! - `ExpressionError`: Template rendering failures
//! - `AdapterError`: Failures surfaced by node adapters
//! - `InstanceError`: Instance/record storage failures
//! - `ConfirmError`: Human-confirmation lifecycle failures
//! - `EngineError`: Execution failures (wraps lower errors)
//! - `WorkflowError`: High-level workflow operations

use flywheel_auth::AuthError;
use flywheel_core::{ConfirmId, InstanceId, InstanceNodeId, NodeId};
use std::fmt;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// The graph has no start node assigned.
    StartNotSet,
    /// A transition was attached to a switch node, which must remain the
    /// tail of its incoming chain.
    SwitchMustBeTail { node_id: NodeId },
    /// A control node's configuration failed to decode or validate.
    InvalidConfig { node_id: NodeId, reason: String },
    /// A traversal exceeded the step budget.
    StepBudgetExceeded { budget: usize },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::StartNotSet => write!(f, "workflow has no start node"),
            Self::SwitchMustBeTail { node_id } => {
                write!(f, "switch node {node_id} must remain the tail of its chain")
            }
            Self::InvalidConfig { node_id, reason } => {
                write!(f, "invalid configuration on node {node_id}: {reason}")
            }
            Self::StepBudgetExceeded { budget } => {
                write!(f, "graph traversal exceeded step budget of {budget}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from expression rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// A template opening was never closed.
    UnterminatedTemplate { expression: String },
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedTemplate { expression } => {
                write!(f, "unterminated template in expression '{expression}'")
            }
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Errors surfaced by node adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The remote API rejected the credential.
    TokenUnauthorized,
    /// No adapter is registered for the class.
    NotRegistered { class: String },
    /// An adapter is already registered for the class.
    AlreadyRegistered { class: String },
    /// The adapter call failed.
    Failed { reason: String },
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenUnauthorized => write!(f, "credential rejected by remote API"),
            Self::NotRegistered { class } => {
                write!(f, "no adapter registered for class '{class}'")
            }
            Self::AlreadyRegistered { class } => {
                write!(f, "adapter already registered for class '{class}'")
            }
            Self::Failed { reason } => write!(f, "adapter call failed: {reason}"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Errors from instance/record storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    /// Instance not found.
    InstanceNotFound { id: InstanceId },
    /// Record not found.
    RecordNotFound { id: InstanceNodeId },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstanceNotFound { id } => write!(f, "instance not found: {id}"),
            Self::RecordNotFound { id } => write!(f, "instance record not found: {id}"),
            Self::StorageFailed { reason } => {
                write!(f, "instance storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for InstanceError {}

/// Errors from the confirmation lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    /// Confirmation not found.
    NotFound { id: ConfirmId },
    /// The confirmation was already decided.
    AlreadyDecided { id: ConfirmId },
    /// The confirmation expired before a decision arrived.
    Expired { id: ConfirmId },
    /// Enqueueing the resumed work failed.
    QueueFailed { reason: String },
    /// Instance bookkeeping failed.
    Instance(InstanceError),
}

impl fmt::Display for ConfirmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "confirmation not found: {id}"),
            Self::AlreadyDecided { id } => {
                write!(f, "confirmation already decided: {id}")
            }
            Self::Expired { id } => write!(f, "confirmation expired: {id}"),
            Self::QueueFailed { reason } => write!(f, "work enqueue failed: {reason}"),
            Self::Instance(e) => write!(f, "instance error: {e}"),
        }
    }
}

impl std::error::Error for ConfirmError {}

impl From<InstanceError> for ConfirmError {
    fn from(e: InstanceError) -> Self {
        Self::Instance(e)
    }
}

/// Errors during workflow execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Graph lookup failure mid-run.
    Graph(GraphError),
    /// Expression rendering failure.
    Expression(ExpressionError),
    /// The run exceeded the configured step budget.
    StepBudgetExceeded { budget: usize },
    /// Authorizer construction or token access failed.
    Auth(AuthError),
    /// Record persistence failed.
    Instance(InstanceError),
    /// Confirm persistence failed.
    Confirm(ConfirmError),
    /// Adapter registry failure.
    Adapter(AdapterError),
    /// A manual node run exceeded its timeout.
    Timeout { node_id: NodeId },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(e) => write!(f, "graph error: {e}"),
            Self::Expression(e) => write!(f, "expression error: {e}"),
            Self::StepBudgetExceeded { budget } => {
                write!(f, "execution exceeded step budget of {budget}")
            }
            Self::Auth(e) => write!(f, "auth error: {e}"),
            Self::Instance(e) => write!(f, "instance error: {e}"),
            Self::Confirm(e) => write!(f, "confirm error: {e}"),
            Self::Adapter(e) => write!(f, "adapter error: {e}"),
            Self::Timeout { node_id } => write!(f, "node {node_id} timed out"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<ExpressionError> for EngineError {
    fn from(e: ExpressionError) -> Self {
        Self::Expression(e)
    }
}

impl From<AuthError> for EngineError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<InstanceError> for EngineError {
    fn from(e: InstanceError) -> Self {
        Self::Instance(e)
    }
}

impl From<ConfirmError> for EngineError {
    fn from(e: ConfirmError) -> Self {
        Self::Confirm(e)
    }
}

impl From<AdapterError> for EngineError {
    fn from(e: AdapterError) -> Self {
        Self::Adapter(e)
    }
}

/// High-level workflow errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Reachable nodes have not passed testing; enabling may be retried
    /// after the nodes are tested or skipped.
    NodesNotTested { nodes: Vec<NodeId> },
    /// Graph operation failure.
    Graph(GraphError),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodesNotTested { nodes } => {
                write!(f, "{} node(s) have not passed testing", nodes.len())
            }
            Self::Graph(e) => write!(f, "graph error: {e}"),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<GraphError> for WorkflowError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}
