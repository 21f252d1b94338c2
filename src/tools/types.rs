//! Function parameter schemas.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON Schema describing a function's parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionParameters {
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default, rename = "additionalProperties")]
    pub additional_properties: bool,
}

impl Default for FunctionParameters {
    fn default() -> Self {
        Self::empty()
    }
}

impl FunctionParameters {
    /// No parameters.
    pub fn empty() -> Self {
        Self {
            properties: Map::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }

    /// Builder: start an object schema.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            params: Self::empty(),
        }
    }

    /// The full object schema sent to the provider.
    pub fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
            "additionalProperties": self.additional_properties,
        })
    }
}

/// Builder for constructing parameter schemas.
pub struct ParameterBuilder {
    params: FunctionParameters,
}

impl ParameterBuilder {
    fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        self.params.properties.insert(name.clone(), schema);
        if required {
            self.params.required.push(name);
        }
        self
    }

    /// Add a string property.
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "string", "description": description.into()}), required)
    }

    /// Add a number property.
    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "number", "description": description.into()}), required)
    }

    /// Add an integer property.
    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "integer", "description": description.into()}), required)
    }

    /// Add a boolean property.
    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "boolean", "description": description.into()}), required)
    }

    /// Add an enum (string) property.
    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.property(
            name,
            json!({"type": "string", "description": description.into(), "enum": values}),
            required,
        )
    }

    /// Add a property with a hand-written schema.
    pub fn raw(self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        self.property(name, schema, required)
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.params.additional_properties = allowed;
        self
    }

    pub fn build(self) -> FunctionParameters {
        self.params
    }
}
