//! Schema - Attribute schemas for resource types
//!
//! Providers declare a schema for each resource type so that declared
//! configuration can be defaulted and validated before any remote call.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attributes
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::MapValueError {
                                key: field.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if field.required && field.default.is_none() => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' conflicts with '{other}'")]
    Conflict { name: String, other: String },

    #[error("Attribute '{name}' requires '{other}'")]
    RequiredWith { name: String, other: String },

    #[error("Computed attribute '{name}' cannot be set")]
    ComputedSet { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Set by the remote API, never by configuration
    pub computed: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    /// Attributes that may not be set together with this one
    pub conflicts_with: Vec<String>,
    /// Attributes that must be set whenever this one is
    pub required_with: Vec<String>,
    /// Maps a value to the canonical form used when comparing for changes
    pub normalize: Option<fn(&Value) -> Value>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            default: None,
            description: None,
            computed: false,
            force_new: false,
            conflicts_with: Vec::new(),
            required_with: Vec::new(),
            normalize: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn conflicts_with(mut self, names: &[&str]) -> Self {
        self.conflicts_with = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn required_with(mut self, names: &[&str]) -> Self {
        self.required_with = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn normalized_with(mut self, normalize: fn(&Value) -> Value) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Whether two values are the same once normalized
    pub fn equivalent(&self, a: &Value, b: &Value) -> bool {
        match self.normalize {
            Some(normalize) => normalize(a) == normalize(b),
            None => a == b,
        }
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Fill in declared defaults for attributes that were not set,
    /// including defaults of fields inside nested blocks that are present
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
            if let AttributeType::Block(fields) = &schema.attr_type
                && let Some(Value::Map(block)) = attributes.get_mut(name)
            {
                for field in fields {
                    if let Some(default) = &field.default {
                        block
                            .entry(field.name.clone())
                            .or_insert_with(|| default.clone());
                    }
                }
            }
        }
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            let Some(schema) = self.attributes.get(name) else {
                // Unknown attributes are allowed (for flexibility)
                continue;
            };
            if schema.computed && !schema.required && schema.default.is_none() {
                errors.push(TypeError::ComputedSet { name: name.clone() });
                continue;
            }
            if let Err(e) = schema.attr_type.validate(value) {
                errors.push(e);
            }
            for other in &schema.conflicts_with {
                if attributes.contains_key(other) {
                    errors.push(TypeError::Conflict {
                        name: name.clone(),
                        other: other.clone(),
                    });
                }
            }
            for other in &schema.required_with {
                if !attributes.contains_key(other) {
                    errors.push(TypeError::RequiredWith {
                        name: name.clone(),
                        other: other.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// ARN type (e.g., "arn:aws:sns:us-east-1:123456789012:topic")
    pub fn arn() -> AttributeType {
        AttributeType::Custom {
            name: "Arn".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_arn(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// List of strings
    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    /// String-to-string map (tags)
    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}

/// Validate ARN format: `arn:partition:service:region:account:resource`
pub fn validate_arn(arn: &str) -> Result<(), String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return Err(format!(
            "Invalid ARN '{}': expected arn:partition:service:region:account:resource",
            arn
        ));
    }
    if parts[1].is_empty() || parts[2].is_empty() || parts[5].is_empty() {
        return Err(format!(
            "Invalid ARN '{}': partition, service and resource must not be empty",
            arn
        ));
    }
    Ok(())
}
