//! Declared input schemas for tools and argument validation.

use serde_json::{json, Map, Value};

use crate::types::{McpError, McpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldType,
    pub required: bool,
    pub description: Option<String>,
}

/// Field names, types and optionality of a tool's arguments object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: FieldType, description: &str) -> Self {
        self.field(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: FieldType, description: &str) -> Self {
        self.field(name, kind, false, description)
    }

    fn field(mut self, name: &str, kind: FieldType, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: (!description.is_empty()).then(|| description.to_string()),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check an arguments payload. Extra fields are accepted.
    pub fn validate(&self, args: &Value) -> McpResult<()> {
        let obj = args.as_object().ok_or_else(|| McpError::SchemaValidationError {
            field: "arguments".to_string(),
            reason: format!("expected object, got {}", type_name(args)),
        })?;

        for spec in &self.fields {
            match obj.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(McpError::SchemaValidationError {
                        field: spec.name.clone(),
                        reason: "required field is missing".to_string(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.matches(value) => {
                    return Err(McpError::SchemaValidationError {
                        field: spec.name.clone(),
                        reason: format!(
                            "expected {}, got {}",
                            spec.kind.as_str(),
                            type_name(value)
                        ),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// JSON-Schema rendering advertised in `tools/list`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.fields {
            let mut prop = json!({ "type": spec.kind.as_str() });
            if let Some(desc) = &spec.description {
                prop["description"] = Value::String(desc.clone());
            }
            properties.insert(spec.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
