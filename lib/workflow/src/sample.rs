//! Output flattening for field selection.
//!
//! Raw node output is converted into addressable (reference, value) pairs so
//! the UI can offer individual fields for selection in downstream
//! expressions. Depth-first and order-preserving; consumed by, but separate
//! from, execution.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One addressable output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleField {
    /// Dotted reference, e.g. `output.items.0.name`.
    pub reference: String,
    /// The value at that reference.
    pub value: JsonValue,
}

/// Flattens raw node output into addressable fields.
#[must_use]
pub fn flatten(output: &JsonValue) -> Vec<SampleField> {
    let mut fields = Vec::new();
    walk(output, "output".to_string(), &mut fields);
    fields
}

fn walk(value: &JsonValue, reference: String, fields: &mut Vec<SampleField>) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                walk(child, format!("{reference}.{key}"), fields);
            }
        }
        JsonValue::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                walk(child, format!("{reference}.{index}"), fields);
            }
        }
        leaf => fields.push(SampleField {
            reference,
            value: leaf.clone(),
        }),
    }
}
