use super::{ObjectSchema, ParameterSchema, COMPAT_FIELD};
use serde_json::{Map, Value};

/// Outcome of probing a converted schema with minimal argument sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaHealth {
    /// `{}` is accepted.
    AcceptsEmpty,
    /// `{}` is only accepted once the compatibility field is present.
    AcceptsCompatField,
    /// Accepted once every required field carries a placeholder value.
    AcceptsPlaceholders,
    /// None of the minimal argument sets were accepted. The tool is still registered.
    Degraded,
}

impl SchemaHealth {
    pub fn is_degraded(self) -> bool {
        self == SchemaHealth::Degraded
    }

    pub fn label(self) -> &'static str {
        match self {
            SchemaHealth::AcceptsEmpty => "accepts-empty",
            SchemaHealth::AcceptsCompatField => "accepts-compat-field",
            SchemaHealth::AcceptsPlaceholders => "accepts-placeholders",
            SchemaHealth::Degraded => "degraded",
        }
    }
}

pub fn self_check(schema: &ParameterSchema) -> SchemaHealth {
    if schema.validate(&Value::Object(Map::new())).is_ok() {
        return SchemaHealth::AcceptsEmpty;
    }

    let mut compat = Map::new();
    compat.insert(COMPAT_FIELD.to_string(), Value::Null);
    if schema.validate(&Value::Object(compat)).is_ok() {
        return SchemaHealth::AcceptsCompatField;
    }

    if let ParameterSchema::Object(object) = schema {
        if schema.validate(&placeholder_arguments(object)).is_ok() {
            return SchemaHealth::AcceptsPlaceholders;
        }
    }

    SchemaHealth::Degraded
}

fn placeholder_arguments(object: &ObjectSchema) -> Value {
    let arguments = object
        .required_fields()
        .map(|field| (field.name.clone(), placeholder(&field.schema)))
        .collect();
    Value::Object(arguments)
}

fn placeholder(schema: &ParameterSchema) -> Value {
    match schema {
        ParameterSchema::String { .. } => Value::from(""),
        ParameterSchema::Enum(options) => options
            .first()
            .map(|option| Value::from(option.clone()))
            .unwrap_or_else(|| Value::from("")),
        ParameterSchema::Number { .. } => Value::from(0),
        ParameterSchema::Boolean => Value::Bool(false),
        ParameterSchema::Array { .. } => Value::Array(Vec::new()),
        ParameterSchema::Null => Value::Null,
        ParameterSchema::Nullable(inner) => placeholder(inner),
        ParameterSchema::Any | ParameterSchema::Object(_) => Value::Object(Map::new()),
    }
}
