//! Synthetic tool arguments.
//!
//! When a smoke run has no supplied arguments for a tool, placeholders
//! are derived from the tool's input schema: an enum contributes its
//! first value, otherwise each property gets a type-appropriate default.

use serde_json::{Map, Value, json};

/// Short string placeholder for untyped or string properties.
const STRING_PLACEHOLDER: &str = "probe";

/// Build an argument object for a tool from its input schema.
///
/// Every declared property gets a value; tools with no usable schema get
/// an empty object.
pub fn synthesize_args(input_schema: &Value) -> Value {
    let Some(properties) = input_schema.get("properties").and_then(|p| p.as_object()) else {
        return Value::Object(Map::new());
    };

    let mut args = Map::new();
    for (name, prop_schema) in properties {
        args.insert(name.clone(), placeholder(prop_schema));
    }
    Value::Object(args)
}

/// A placeholder for one property schema.
fn placeholder(schema: &Value) -> Value {
    // Enum wins regardless of declared type.
    if let Some(first) = schema
        .get("enum")
        .and_then(|e| e.as_array())
        .and_then(|values| values.first())
    {
        return first.clone();
    }

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("string") => json!(STRING_PLACEHOLDER),
        Some("integer") => json!(1),
        Some("number") => json!(1),
        Some("boolean") => json!(true),
        Some("array") => json!([]),
        Some("object") => json!({}),
        _ => json!(STRING_PLACEHOLDER),
    }
}
