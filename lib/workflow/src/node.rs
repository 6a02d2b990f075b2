//! Workflow node types and control-node configurations.
//!
//! A node carries a class tag identifying its adapter behavior, an untyped
//! input-field map (which may contain templated expressions), and a
//! transition to the next node. The control classes (`switch`, `foreach`,
//! `confirm`) store graph-shaped configuration inside the input-field map;
//! those are decoded into first-class typed structures and validated at the
//! graph-mutation boundary rather than trusted at read time.

use crate::error::GraphError;
use flywheel_core::{CredentialId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// A node's class tag, identifying its adapter behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeClass(String);

impl NodeClass {
    /// Class tag of the branching control node.
    pub const SWITCH: &'static str = "switch";
    /// Class tag of the looping control node.
    pub const FOREACH: &'static str = "foreach";
    /// Class tag of the human-in-the-loop pause node.
    pub const CONFIRM: &'static str = "confirm";

    /// Creates a class from a tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the structural kind the interpreter dispatches on.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self.0.as_str() {
            Self::SWITCH => NodeKind::Switch,
            Self::FOREACH => NodeKind::Foreach,
            Self::CONFIRM => NodeKind::Confirm,
            _ => NodeKind::Action,
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeClass {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// The closed set of structural node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An adapter-backed node resolved through the registry.
    Action,
    /// Multi-way branch over ordered condition paths.
    Switch,
    /// Sequential iteration over a resolved collection.
    Foreach,
    /// Suspension point awaiting a human decision.
    Confirm,
}

/// Per-node testing status, gating workflow activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestingStatus {
    /// Not yet exercised with sample data.
    #[default]
    Default,
    /// Last test run succeeded.
    TestSuccess,
    /// Last test run failed.
    TestFail,
    /// The user chose to skip testing this node.
    UserSkip,
}

/// Events driving the testing status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestingEvent {
    /// A test run succeeded.
    TestPassed,
    /// A test run failed.
    TestFailed,
    /// The user skipped testing.
    Skipped,
    /// The node's class or input fields changed materially.
    InputChanged,
}

impl TestingStatus {
    /// Applies an event, returning the next status.
    ///
    /// Every (status, event) pair is valid: test results and skips may be
    /// recorded from any state, and any material change re-enters `Default`.
    #[must_use]
    pub fn apply(self, event: TestingEvent) -> Self {
        match event {
            TestingEvent::TestPassed => Self::TestSuccess,
            TestingEvent::TestFailed => Self::TestFail,
            TestingEvent::Skipped => Self::UserSkip,
            TestingEvent::InputChanged => Self::Default,
        }
    }

    /// Returns true when this status does not block activation.
    #[must_use]
    pub fn is_passing(self) -> bool {
        matches!(self, Self::TestSuccess | Self::UserSkip)
    }
}

/// A boolean condition within a switch path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// The left operand: an expression or literal.
    pub left: String,
    /// The comparison operator.
    pub operator: ConditionOperator,
    /// The right operand; may itself contain a template.
    #[serde(default)]
    pub right: JsonValue,
}

/// Comparison operators available in switch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

/// One ordered path of a switch node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPath {
    /// Human-readable path name.
    pub name: String,
    /// Whether this path is taken when no other path matches.
    #[serde(default)]
    pub is_default: bool,
    /// AND-combined conditions; an empty set never matches on its own.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Head of this path's sub-chain.
    #[serde(default)]
    pub transition: Option<NodeId>,
}

/// Typed configuration of a switch node, stored in its input fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Ordered paths; the first matching path wins.
    #[serde(default)]
    pub paths: Vec<SwitchPath>,
}

/// Typed configuration of a foreach node, stored in its input fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachConfig {
    /// Expression yielding the collection to iterate.
    pub input_collection: String,
    /// Head of the loop body's sub-chain.
    #[serde(default)]
    pub transition: Option<NodeId>,
}

/// Typed configuration of a confirm node, stored in its input fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// How long the pending confirmation stays decidable.
    #[serde(default = "default_confirm_expiry_hours")]
    pub expires_in_hours: u32,
}

fn default_confirm_expiry_hours() -> u32 {
    72
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            expires_in_hours: default_confirm_expiry_hours(),
        }
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the workflow.
    pub id: NodeId,
    /// Human-readable name.
    pub name: String,
    /// Adapter class tag.
    pub class: NodeClass,
    /// The next node in the chain; `None` means terminal.
    pub transition: Option<NodeId>,
    /// Untyped input configuration; values may contain templates.
    pub input_fields: Map<String, JsonValue>,
    /// Credential used by the adapter, if any.
    pub credential_id: Option<CredentialId>,
    /// Testing status gating activation.
    pub testing_status: TestingStatus,
}

impl Node {
    /// Creates a new node with an empty input-field map.
    #[must_use]
    pub fn new(name: impl Into<String>, class: impl Into<NodeClass>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            class: class.into(),
            transition: None,
            input_fields: Map::new(),
            credential_id: None,
            testing_status: TestingStatus::Default,
        }
    }

    /// Sets the input fields.
    #[must_use]
    pub fn with_input_fields(mut self, input_fields: Map<String, JsonValue>) -> Self {
        self.input_fields = input_fields;
        self
    }

    /// Sets the credential reference.
    #[must_use]
    pub fn with_credential(mut self, credential_id: CredentialId) -> Self {
        self.credential_id = Some(credential_id);
        self
    }

    /// Sets the transition.
    #[must_use]
    pub fn with_transition(mut self, transition: NodeId) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Returns the structural kind of this node.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.class.kind()
    }

    /// Replaces the input fields, resetting the testing status when the new
    /// fields differ structurally from the old ones.
    pub fn update_input_fields(&mut self, input_fields: Map<String, JsonValue>) {
        if self.input_fields != input_fields {
            self.testing_status = self.testing_status.apply(TestingEvent::InputChanged);
        }
        self.input_fields = input_fields;
    }

    /// Replaces the class tag, resetting the testing status on change.
    pub fn update_class(&mut self, class: NodeClass) {
        if self.class != class {
            self.testing_status = self.testing_status.apply(TestingEvent::InputChanged);
        }
        self.class = class;
    }

    /// Decodes the switch configuration from the input fields.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a switch node or the configuration
    /// fails to decode.
    pub fn switch_config(&self) -> Result<SwitchConfig, GraphError> {
        self.decode_config(NodeKind::Switch)
    }

    /// Decodes the foreach configuration from the input fields.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a foreach node or the configuration
    /// fails to decode.
    pub fn foreach_config(&self) -> Result<ForeachConfig, GraphError> {
        self.decode_config(NodeKind::Foreach)
    }

    /// Decodes the confirm configuration from the input fields.
    ///
    /// # Errors
    ///
    /// Returns an error if this is not a confirm node or the configuration
    /// fails to decode.
    pub fn confirm_config(&self) -> Result<ConfirmConfig, GraphError> {
        self.decode_config(NodeKind::Confirm)
    }

    fn decode_config<T: serde::de::DeserializeOwned>(
        &self,
        expected: NodeKind,
    ) -> Result<T, GraphError> {
        if self.kind() != expected {
            return Err(GraphError::InvalidConfig {
                node_id: self.id,
                reason: format!("node class '{}' is not a {expected:?} node", self.class),
            });
        }
        serde_json::from_value(JsonValue::Object(self.input_fields.clone())).map_err(|e| {
            GraphError::InvalidConfig {
                node_id: self.id,
                reason: e.to_string(),
            }
        })
    }

    /// Writes a control configuration back into the input fields.
    ///
    /// Used by graph mutation to rewire nested transition pointers; does not
    /// reset the testing status (pointer splices are not material edits).
    pub(crate) fn overwrite_config<T: Serialize>(&mut self, config: &T) {
        if let Ok(JsonValue::Object(map)) = serde_json::to_value(config) {
            for (key, value) in map {
                self.input_fields.insert(key, value);
            }
        }
    }

    /// Validates the node's configuration for insertion into a graph.
    ///
    /// Control-node configurations must decode; a switch must carry no
    /// outgoing transition (tail invariant) and at most one default path.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violation.
    pub fn validate_config(&self) -> Result<(), GraphError> {
        match self.kind() {
            NodeKind::Switch => {
                if self.transition.is_some() {
                    return Err(GraphError::SwitchMustBeTail { node_id: self.id });
                }
                let config = self.switch_config()?;
                let defaults = config.paths.iter().filter(|p| p.is_default).count();
                if defaults > 1 {
                    return Err(GraphError::InvalidConfig {
                        node_id: self.id,
                        reason: format!("switch has {defaults} default paths"),
                    });
                }
                Ok(())
            }
            NodeKind::Foreach => self.foreach_config().map(|_| ()),
            NodeKind::Confirm => self.confirm_config().map(|_| ()),
            NodeKind::Action => Ok(()),
        }
    }
}
