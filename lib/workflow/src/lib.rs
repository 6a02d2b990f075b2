//! Node graph model and execution engine for the flywheel platform.
//!
//! This crate provides:
//!
//! - **Node Model**: nodes with class tags, transitions, and typed control
//!   configurations (`switch`, `foreach`, `confirm`)
//! - **Graph**: the mutable linked structure with splice-on-delete semantics
//! - **Expressions**: template rendering of node input against accumulated
//!   per-node output and foreach iteration scope
//! - **Execution Engine**: the single-cursor interpreter with a step budget,
//!   confirm suspension, and fail-fast partial-progress recording
//! - **Testing State Machine**: per-node testing status gating activation
//! - **Samples**: output flattening and selected-sample bookkeeping

pub mod activation;
pub mod adapter;
pub mod confirm;
pub mod definition;
pub mod engine;
pub mod error;
pub mod expression;
pub mod graph;
pub mod instance;
pub mod node;
pub mod sample;
pub mod settings;

pub use activation::{FeatureGate, NODE_TESTING_GATE, StaticFeatureGate, ensure_activatable};
pub use adapter::{Adapter, AdapterRegistry, RunContext};
pub use confirm::{
    ConfirmDecision, ConfirmManager, ConfirmRecord, ConfirmStatus, ConfirmStore, MemoryConfirmStore,
    MemoryWorkQueue, WorkQueue, WorkUnit,
};
pub use definition::{Workflow, WorkflowMetadata};
pub use engine::{ChainOutcome, Executor, RunOutcome};
pub use error::{
    AdapterError, ConfirmError, EngineError, ExpressionError, GraphError, InstanceError,
    WorkflowError,
};
pub use expression::{IterScope, Scope};
pub use graph::WorkflowGraph;
pub use instance::{
    InstanceNode, InstanceStatus, InstanceStore, MemoryInstanceStore, NodeRunStatus, RecordSource,
    WorkflowInstance,
};
pub use node::{
    Condition, ConditionOperator, ConfirmConfig, ForeachConfig, Node, NodeClass, NodeKind,
    SwitchConfig, SwitchPath, TestingEvent, TestingStatus,
};
pub use sample::{SampleField, flatten};
pub use settings::EngineSettings;
