//! Runtime-checked parameter schemas for remotely defined tools.
//!
//! Remote MCP tools describe their arguments with JSON Schema. [`convert`]
//! turns that description into a [`ParameterSchema`] the registry can validate
//! arguments against before anything reaches the network, and that can be
//! rendered back to JSON Schema for a tool-calling provider.
//!
//! Conversion is total: malformed input degrades to a permissive schema and
//! never fails. Every converted schema accepts an empty argument object,
//! possibly after the synthetic [`COMPAT_FIELD`] is injected, so providers that
//! cannot express complex schemas can still call the tool.

mod convert;
mod self_check;

pub use convert::{convert, convert_with, ConvertOptions};
pub use self_check::{self_check, SchemaHealth};

use serde_json::{Map, Value};
use std::fmt;

/// Optional field accepted by permissive objects and stripped before
/// arguments are forwarded to the hub.
pub const COMPAT_FIELD: &str = "_compat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Uri,
    Email,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSchema {
    Any,
    Null,
    Boolean,
    String {
        format: Option<StringFormat>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    /// Closed set of string values.
    Enum(Vec<String>),
    Number {
        integer: bool,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Array {
        items: Box<ParameterSchema>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object(ObjectSchema),
    /// Accepts `null` in addition to the inner schema.
    Nullable(Box<ParameterSchema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
    /// Keep undeclared keys instead of stripping them.
    pub passthrough: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: ParameterSchema,
    pub required: bool,
    pub description: Option<String>,
}

/// Argument rejected by a [`ParameterSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() {
                "$".to_string()
            } else {
                path.to_string()
            },
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaViolation {}

impl ObjectSchema {
    /// Object with no declared fields that accepts any keys.
    pub fn permissive() -> Self {
        Self {
            fields: Vec::new(),
            passthrough: true,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| field.required)
    }
}

impl ParameterSchema {
    pub fn is_object(&self) -> bool {
        matches!(self, ParameterSchema::Object(_))
    }

    /// Validates `value` and returns the cleaned value.
    ///
    /// Non-passthrough objects drop undeclared keys rather than rejecting
    /// them; passthrough objects keep them untouched.
    pub fn parse(&self, value: &Value) -> Result<Value, SchemaViolation> {
        self.parse_at(value, "")
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.parse(value).map(|_| ())
    }

    fn parse_at(&self, value: &Value, path: &str) -> Result<Value, SchemaViolation> {
        match self {
            ParameterSchema::Any => Ok(value.clone()),
            ParameterSchema::Null => match value {
                Value::Null => Ok(Value::Null),
                other => Err(type_mismatch(path, "null", other)),
            },
            ParameterSchema::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(type_mismatch(path, "boolean", other)),
            },
            ParameterSchema::String {
                format,
                min_length,
                max_length,
            } => {
                let Value::String(text) = value else {
                    return Err(type_mismatch(path, "string", value));
                };
                let length = text.chars().count();
                if let Some(min) = min_length {
                    if length < *min {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected at least {min} characters, got {length}"),
                        ));
                    }
                }
                if let Some(max) = max_length {
                    if length > *max {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected at most {max} characters, got {length}"),
                        ));
                    }
                }
                match format {
                    Some(StringFormat::Uri) if reqwest::Url::parse(text).is_err() => {
                        Err(SchemaViolation::new(path, "expected a valid URI"))
                    }
                    Some(StringFormat::Email) if !looks_like_email(text) => {
                        Err(SchemaViolation::new(path, "expected a valid email address"))
                    }
                    _ => Ok(value.clone()),
                }
            }
            ParameterSchema::Enum(options) => match value {
                Value::String(text) if options.iter().any(|option| option == text) => {
                    Ok(value.clone())
                }
                Value::String(text) => Err(SchemaViolation::new(
                    path,
                    format!("expected one of [{}], got \"{text}\"", options.join(", ")),
                )),
                other => Err(type_mismatch(path, "string", other)),
            },
            ParameterSchema::Number {
                integer,
                minimum,
                maximum,
            } => {
                let Some(number) = value.as_f64() else {
                    return Err(type_mismatch(
                        path,
                        if *integer { "integer" } else { "number" },
                        value,
                    ));
                };
                if *integer && number.fract() != 0.0 {
                    return Err(SchemaViolation::new(
                        path,
                        format!("expected an integer, got {number}"),
                    ));
                }
                if let Some(min) = minimum {
                    if number < *min {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected a value >= {min}, got {number}"),
                        ));
                    }
                }
                if let Some(max) = maximum {
                    if number > *max {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected a value <= {max}, got {number}"),
                        ));
                    }
                }
                Ok(value.clone())
            }
            ParameterSchema::Array {
                items,
                min_items,
                max_items,
            } => {
                let Value::Array(elements) = value else {
                    return Err(type_mismatch(path, "array", value));
                };
                if let Some(min) = min_items {
                    if elements.len() < *min {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected at least {min} items, got {}", elements.len()),
                        ));
                    }
                }
                if let Some(max) = max_items {
                    if elements.len() > *max {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected at most {max} items, got {}", elements.len()),
                        ));
                    }
                }
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| items.parse_at(element, &format!("{path}[{index}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            ParameterSchema::Object(object) => object.parse_at(value, path),
            ParameterSchema::Nullable(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.parse_at(other, path),
            },
        }
    }

    /// Renders the schema as JSON Schema for a tool-calling provider.
    pub fn to_json_schema(&self) -> Value {
        match self {
            ParameterSchema::Any => Value::Object(Map::new()),
            ParameterSchema::Null => serde_json::json!({ "type": "null" }),
            ParameterSchema::Boolean => serde_json::json!({ "type": "boolean" }),
            ParameterSchema::String {
                format,
                min_length,
                max_length,
            } => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), Value::from("string"));
                match format {
                    Some(StringFormat::Uri) => {
                        schema.insert("format".to_string(), Value::from("uri"));
                    }
                    Some(StringFormat::Email) => {
                        schema.insert("format".to_string(), Value::from("email"));
                    }
                    None => {}
                }
                if let Some(min) = min_length {
                    schema.insert("minLength".to_string(), Value::from(*min));
                }
                if let Some(max) = max_length {
                    schema.insert("maxLength".to_string(), Value::from(*max));
                }
                Value::Object(schema)
            }
            ParameterSchema::Enum(options) => {
                serde_json::json!({ "type": "string", "enum": options })
            }
            ParameterSchema::Number {
                integer,
                minimum,
                maximum,
            } => {
                let mut schema = Map::new();
                schema.insert(
                    "type".to_string(),
                    Value::from(if *integer { "integer" } else { "number" }),
                );
                if let Some(min) = minimum {
                    schema.insert("minimum".to_string(), Value::from(*min));
                }
                if let Some(max) = maximum {
                    schema.insert("maximum".to_string(), Value::from(*max));
                }
                Value::Object(schema)
            }
            ParameterSchema::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), Value::from("array"));
                schema.insert("items".to_string(), items.to_json_schema());
                if let Some(min) = min_items {
                    schema.insert("minItems".to_string(), Value::from(*min));
                }
                if let Some(max) = max_items {
                    schema.insert("maxItems".to_string(), Value::from(*max));
                }
                Value::Object(schema)
            }
            ParameterSchema::Object(object) => object.to_json_schema(),
            ParameterSchema::Nullable(inner) => {
                serde_json::json!({ "anyOf": [inner.to_json_schema(), { "type": "null" }] })
            }
        }
    }
}

impl ObjectSchema {
    fn parse_at(&self, value: &Value, path: &str) -> Result<Value, SchemaViolation> {
        let Value::Object(entries) = value else {
            return Err(type_mismatch(path, "object", value));
        };

        let mut cleaned = Map::new();
        for field in &self.fields {
            let field_path = if path.is_empty() {
                field.name.clone()
            } else {
                format!("{path}.{}", field.name)
            };
            match entries.get(&field.name) {
                Some(entry) => {
                    cleaned.insert(field.name.clone(), field.schema.parse_at(entry, &field_path)?);
                }
                None if field.required => {
                    return Err(SchemaViolation::new(&field_path, "required field is missing"));
                }
                None => {}
            }
        }

        if self.passthrough {
            for (key, entry) in entries {
                if self.field(key).is_none() {
                    cleaned.insert(key.clone(), entry.clone());
                }
            }
        }

        Ok(Value::Object(cleaned))
    }

    fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = field.schema.to_json_schema();
            if let (Some(description), Value::Object(map)) = (&field.description, &mut property) {
                map.insert("description".to_string(), Value::from(description.clone()));
            }
            properties.insert(field.name.clone(), property);
        }
        let required: Vec<Value> = self
            .required_fields()
            .map(|field| Value::from(field.name.clone()))
            .collect();

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::from("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema.insert(
            "additionalProperties".to_string(),
            Value::Bool(self.passthrough),
        );
        Value::Object(schema)
    }
}

fn type_mismatch(path: &str, expected: &str, actual: &Value) -> SchemaViolation {
    SchemaViolation::new(
        path,
        format!("expected {expected}, got {}", json_type_name(actual)),
    )
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn looks_like_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !text.chars().any(char::is_whitespace)
}
