//! Expression rendering for node input fields.
//!
//! Input-field values may embed `{{ … }}` templates that are evaluated
//! against the accumulated execution scope: the trigger input (`input.*`),
//! upstream node outputs (`node.<id>.output.*`), and — inside a foreach body
//! — the iteration scratch scope (`iter.*`). A value that is a single
//! template preserves the resolved JSON type; embedded templates interpolate
//! into strings. Unresolvable references render as null rather than failing
//! the run.

use crate::error::ExpressionError;
use crate::node::{Condition, ConditionOperator};
use flywheel_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::HashMap;

/// The per-iteration scratch scope of a foreach body.
///
/// Visible only to nodes inside the loop body; discarded at the loop
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct IterScope {
    /// The current collection item.
    pub loop_item: JsonValue,
    /// Zero-based iteration index.
    pub loop_iteration: usize,
    /// Total number of iterations.
    pub loop_total_iterations: usize,
}

impl IterScope {
    /// Returns true on the final iteration.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.loop_iteration + 1 == self.loop_total_iterations
    }
}

/// The accumulated evaluation scope of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    /// The external input that started the run.
    input: JsonValue,
    /// Recorded output per executed node.
    node_outputs: HashMap<NodeId, JsonValue>,
    /// The active foreach scratch scope; never serialized, never outlives
    /// the iteration it belongs to.
    #[serde(skip)]
    iter: Option<IterScope>,
}

impl Scope {
    /// Creates a scope over the given external input.
    #[must_use]
    pub fn new(input: JsonValue) -> Self {
        Self {
            input,
            node_outputs: HashMap::new(),
            iter: None,
        }
    }

    /// Records a node's output for downstream references.
    pub fn record_output(&mut self, node_id: NodeId, output: JsonValue) {
        self.node_outputs.insert(node_id, output);
    }

    /// Returns a node's recorded output.
    #[must_use]
    pub fn output(&self, node_id: NodeId) -> Option<&JsonValue> {
        self.node_outputs.get(&node_id)
    }

    /// Installs the iteration scratch scope.
    pub fn set_iter(&mut self, iter: IterScope) {
        self.iter = Some(iter);
    }

    /// Drops the iteration scratch scope at the loop boundary.
    pub fn clear_iter(&mut self) {
        self.iter = None;
    }

    /// Removes and returns the active iteration scope.
    ///
    /// Nested loops save the enclosing scope here and restore it afterwards.
    pub fn take_iter(&mut self) -> Option<IterScope> {
        self.iter.take()
    }

    /// Restores a previously taken iteration scope.
    pub fn restore_iter(&mut self, iter: Option<IterScope>) {
        self.iter = iter;
    }

    /// Returns the active iteration scope.
    #[must_use]
    pub fn iter(&self) -> Option<&IterScope> {
        self.iter.as_ref()
    }

    /// Resolves a bare reference expression to a value.
    ///
    /// Unknown references resolve to null.
    #[must_use]
    pub fn resolve(&self, expr: &str) -> JsonValue {
        let expr = expr.trim();

        if expr == "input" {
            return self.input.clone();
        }
        if let Some(path) = expr.strip_prefix("input.") {
            return lookup_path(&self.input, path).unwrap_or(JsonValue::Null);
        }

        if let Some(rest) = expr.strip_prefix("iter.") {
            return self.resolve_iter(rest);
        }

        if let Some(rest) = expr.strip_prefix("node.") {
            return self.resolve_node(rest);
        }

        JsonValue::Null
    }

    fn resolve_iter(&self, rest: &str) -> JsonValue {
        let Some(iter) = &self.iter else {
            return JsonValue::Null;
        };
        match rest {
            "loop_item" => iter.loop_item.clone(),
            "loop_iteration" => JsonValue::from(iter.loop_iteration),
            "loop_iteration_is_last" => JsonValue::from(iter.is_last()),
            "loop_total_iterations" => JsonValue::from(iter.loop_total_iterations),
            _ => rest
                .strip_prefix("loop_item.")
                .and_then(|path| lookup_path(&iter.loop_item, path))
                .unwrap_or(JsonValue::Null),
        }
    }

    fn resolve_node(&self, rest: &str) -> JsonValue {
        // Shape: <node-id>.output[.<path>]
        let Some((id_part, tail)) = rest.split_once('.') else {
            return JsonValue::Null;
        };
        let Ok(node_id) = id_part.parse::<NodeId>() else {
            return JsonValue::Null;
        };
        let Some(output) = self.node_outputs.get(&node_id) else {
            return JsonValue::Null;
        };
        if tail == "output" {
            return output.clone();
        }
        tail.strip_prefix("output.")
            .and_then(|path| lookup_path(output, path))
            .unwrap_or(JsonValue::Null)
    }

    /// Renders a string that may contain templates.
    ///
    /// A string that is exactly one template resolves to the referenced
    /// value, preserving its JSON type. Otherwise each embedded template is
    /// interpolated into the surrounding text.
    ///
    /// # Errors
    ///
    /// Returns an error when a template opening is never closed.
    pub fn render_template(&self, raw: &str) -> Result<JsonValue, ExpressionError> {
        let trimmed = raw.trim();
        if let Some(inner) = single_template(trimmed) {
            return Ok(self.resolve(inner));
        }

        let mut out = String::new();
        let mut rest = raw;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(ExpressionError::UnterminatedTemplate {
                    expression: raw.to_string(),
                });
            };
            out.push_str(&stringify(&self.resolve(&after[..end])));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(JsonValue::String(out))
    }

    /// Renders a value tree, evaluating templates in every string leaf.
    ///
    /// # Errors
    ///
    /// Returns an error when any template is malformed.
    pub fn render_value(&self, value: &JsonValue) -> Result<JsonValue, ExpressionError> {
        match value {
            JsonValue::String(s) => self.render_template(s),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.render_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            JsonValue::Object(map) => self.render_fields(map).map(JsonValue::Object),
            other => Ok(other.clone()),
        }
    }

    /// Renders an input-field map.
    ///
    /// # Errors
    ///
    /// Returns an error when any template is malformed.
    pub fn render_fields(
        &self,
        fields: &Map<String, JsonValue>,
    ) -> Result<Map<String, JsonValue>, ExpressionError> {
        fields
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.render_value(value)?)))
            .collect()
    }

    /// Evaluates a switch condition against this scope.
    ///
    /// # Errors
    ///
    /// Returns an error when an operand template is malformed.
    pub fn evaluate_condition(&self, condition: &Condition) -> Result<bool, ExpressionError> {
        let left = self.resolve_operand(&condition.left)?;
        let right = match &condition.right {
            JsonValue::String(s) if s.contains("{{") => self.render_template(s)?,
            other => other.clone(),
        };

        Ok(match condition.operator {
            ConditionOperator::Equals => left == right,
            ConditionOperator::NotEquals => left != right,
            ConditionOperator::Contains => match &left {
                JsonValue::String(s) => {
                    right.as_str().is_some_and(|needle| s.contains(needle))
                }
                JsonValue::Array(items) => items.contains(&right),
                _ => false,
            },
            ConditionOperator::GreaterThan => {
                compare(&left, &right) == Some(Ordering::Greater)
            }
            ConditionOperator::LessThan => compare(&left, &right) == Some(Ordering::Less),
            ConditionOperator::IsEmpty => is_empty(&left),
            ConditionOperator::IsNotEmpty => !is_empty(&left),
        })
    }

    /// Resolves a condition operand: a template, a reference, or a literal.
    fn resolve_operand(&self, raw: &str) -> Result<JsonValue, ExpressionError> {
        if raw.contains("{{") {
            return self.render_template(raw);
        }
        let trimmed = raw.trim();
        if trimmed == "input"
            || trimmed.starts_with("input.")
            || trimmed.starts_with("node.")
            || trimmed.starts_with("iter.")
        {
            return Ok(self.resolve(trimmed));
        }
        Ok(JsonValue::String(raw.to_string()))
    }
}

/// Returns the inner expression when the whole string is one template.
fn single_template(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Follows a dotted path through objects and array indices.
fn lookup_path(root: &JsonValue, path: &str) -> Option<JsonValue> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        match current {
            JsonValue::Object(map) => current = map.get(segment)?,
            JsonValue::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r);
    }
    if let (JsonValue::String(l), JsonValue::String(r)) = (left, right) {
        return Some(l.cmp(r));
    }
    None
}

fn is_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}
