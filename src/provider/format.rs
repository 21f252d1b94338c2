//! Provider formatting helpers.

use serde_json::{json, Value};

use crate::tools::Function;
use crate::types::OutputSchema;

/// Convert a JSON value into the text a model or template sees.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// `data:` URL for a base64 JPEG payload.
pub(crate) fn image_data_url(base64: &str) -> String {
    format!("data:image/jpeg;base64,{base64}")
}

/// Tool definition for Chat Completions.
pub(crate) fn chat_tool(function: &Function) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": function.name(),
            "description": function.description(),
            "parameters": function.parameters().schema(),
            "strict": function.is_strict(),
        }
    })
}

/// Tool definition for the Responses API (flat shape).
pub(crate) fn response_tool(function: &Function) -> Value {
    json!({
        "type": "function",
        "name": function.name(),
        "description": function.description(),
        "parameters": function.parameters().schema(),
        "strict": function.is_strict(),
    })
}

/// `response_format` for Chat Completions structured output.
pub(crate) fn chat_response_format(schema: &OutputSchema) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": schema.name,
            "schema": schema.schema,
            "strict": schema.strict,
        }
    })
}

/// `text.format` for Responses structured output.
pub(crate) fn response_text_format(schema: &OutputSchema) -> Value {
    json!({
        "format": {
            "type": "json_schema",
            "name": schema.name,
            "schema": schema.schema,
            "strict": schema.strict,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionParameters;

    #[test]
    fn strings_render_without_quotes() {
        assert_eq!(value_to_text(&json!("hi")), "hi");
        assert_eq!(value_to_text(&json!(3)), "3");
        assert_eq!(value_to_text(&json!({"a": [1]})), "{\"a\":[1]}");
        assert_eq!(value_to_text(&Value::Null), "null");
    }

    #[test]
    fn tool_shapes_differ_by_api() {
        let f = Function::new(
            "echo",
            "Echo x",
            FunctionParameters::object().integer("x", "value", true).build(),
        );
        let chat = chat_tool(&f);
        assert_eq!(chat["function"]["name"], "echo");
        assert_eq!(chat["function"]["parameters"]["required"], json!(["x"]));
        let resp = response_tool(&f);
        assert_eq!(resp["name"], "echo");
        assert!(resp.get("function").is_none());
    }
}
