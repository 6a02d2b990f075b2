//! Adapter contract and registry.
//!
//! Any node behavior a workflow can execute is an adapter resolved by class
//! tag. Registration happens once at process start; execution only reads the
//! registry.

use crate::error::AdapterError;
use async_trait::async_trait;
use flywheel_auth::Authorizer;
use flywheel_core::{NodeId, WorkflowId};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Context passed to an adapter invocation.
#[derive(Clone)]
pub struct RunContext {
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The node being executed.
    pub node_id: NodeId,
    /// The node's input fields with all templates rendered.
    pub input: Map<String, JsonValue>,
    /// Authorizer for the node's credential, when one is referenced.
    pub authorizer: Option<Arc<Authorizer>>,
}

/// Trait implemented by every executable node behavior.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The class tag this adapter serves.
    fn class(&self) -> &str;

    /// Executes the node, returning its output.
    ///
    /// # Errors
    ///
    /// Returns an error when the operation fails; the engine stops the chain
    /// and records the failure against this node.
    async fn run(&self, ctx: RunContext) -> Result<JsonValue, AdapterError>;
}

/// Registry mapping class tags to adapter implementations.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its class tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the class is already registered; registration is
    /// a process-start concern and duplicates indicate a wiring bug.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) -> Result<(), AdapterError> {
        let class = adapter.class().to_string();
        if self.adapters.contains_key(&class) {
            return Err(AdapterError::AlreadyRegistered { class });
        }
        self.adapters.insert(class, adapter);
        Ok(())
    }

    /// Resolves an adapter by class tag.
    ///
    /// # Errors
    ///
    /// Returns an error if no adapter is registered for the class.
    pub fn get(&self, class: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.adapters
            .get(class)
            .cloned()
            .ok_or_else(|| AdapterError::NotRegistered {
                class: class.to_string(),
            })
    }

    /// Returns true if the class has a registered adapter.
    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.adapters.contains_key(class)
    }
}
