//! Check call arguments against a function's parameter schema before dispatch.

use serde_json::{Map, Value};

use super::types::FunctionParameters;

/// Validate `args` against `params`.
///
/// Checks required fields, top-level property types, enum membership and,
/// when the schema is closed, unknown fields. Returns a description of the
/// first violation.
pub fn validate_arguments(args: &Map<String, Value>, params: &FunctionParameters) -> Result<(), String> {
    for name in &params.required {
        if !args.contains_key(name) {
            return Err(format!("missing required field '{name}'"));
        }
    }

    for (key, value) in args {
        let Some(prop) = params.properties.get(key) else {
            if !params.additional_properties {
                return Err(format!("unexpected field '{key}'"));
            }
            continue;
        };
        if let Some(expected) = prop.get("type").and_then(|v| v.as_str()) {
            if !value_matches_type(value, expected) {
                return Err(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    json_type_name(value)
                ));
            }
        }
        if let Some(allowed) = prop.get("enum").and_then(|v| v.as_array()) {
            if !allowed.contains(value) {
                return Err(format!("field '{key}' must be one of {}", Value::Array(allowed.clone())));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
