use super::{Field, ObjectSchema, ParameterSchema, StringFormat, COMPAT_FIELD};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Nesting beyond this depth is treated as malformed.
const MAX_SCHEMA_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Objects whose fields are all optional also accept undeclared keys.
    /// Needed by providers with strict-schema validators that otherwise reject
    /// calls carrying the compatibility field.
    pub passthrough_all_optional: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            passthrough_all_optional: true,
        }
    }
}

/// Converts a JSON Schema value with default options.
pub fn convert(schema: &Value) -> ParameterSchema {
    convert_with(schema, ConvertOptions::default())
}

/// Converts a JSON Schema value. Never fails: a node that cannot be
/// converted is replaced with a permissive fallback.
pub fn convert_with(schema: &Value, options: ConvertOptions) -> ParameterSchema {
    match convert_node(schema, options, 0) {
        Ok(converted) => converted,
        Err(reason) => {
            warn!(reason = %reason, "JSON schema conversion failed, using fallback object");
            error_fallback(&reason)
        }
    }
}

fn convert_node(
    schema: &Value,
    options: ConvertOptions,
    depth: usize,
) -> Result<ParameterSchema, String> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(format!("schema nesting exceeds {MAX_SCHEMA_DEPTH} levels"));
    }
    let Value::Object(node) = schema else {
        // `true`, `null`, and other non-object nodes carry no constraints we
        // can honour.
        return Ok(ParameterSchema::Any);
    };

    match node.get("type") {
        Some(Value::String(kind)) => convert_typed(kind, node, options, depth),
        Some(Value::Array(kinds)) => convert_union(kinds, node, options, depth),
        Some(other) => Err(format!("unsupported \"type\" value: {other}")),
        None if node.contains_key("enum") => string_enum(node),
        None if node.contains_key("properties") => convert_typed("object", node, options, depth),
        None => Ok(ParameterSchema::Any),
    }
}

fn convert_union(
    kinds: &[Value],
    node: &Map<String, Value>,
    options: ConvertOptions,
    depth: usize,
) -> Result<ParameterSchema, String> {
    let names: Vec<&str> = kinds.iter().filter_map(Value::as_str).collect();
    let nullable = names.contains(&"null");
    let Some(primary) = names.iter().find(|name| **name != "null") else {
        return Ok(if nullable {
            ParameterSchema::Null
        } else {
            ParameterSchema::Any
        });
    };

    let converted = convert_typed(primary, node, options, depth)?;
    Ok(if nullable {
        ParameterSchema::Nullable(Box::new(converted))
    } else {
        converted
    })
}

fn convert_typed(
    kind: &str,
    node: &Map<String, Value>,
    options: ConvertOptions,
    depth: usize,
) -> Result<ParameterSchema, String> {
    match kind {
        "string" if node.contains_key("enum") => string_enum(node),
        "string" => Ok(ParameterSchema::String {
            format: match node.get("format").and_then(Value::as_str) {
                Some("uri") | Some("url") => Some(StringFormat::Uri),
                Some("email") => Some(StringFormat::Email),
                _ => None,
            },
            min_length: read_count(node, "minLength")?,
            max_length: read_count(node, "maxLength")?,
        }),
        "number" | "integer" => Ok(ParameterSchema::Number {
            integer: kind == "integer",
            minimum: read_bound(node, "minimum")?,
            maximum: read_bound(node, "maximum")?,
        }),
        "boolean" => Ok(ParameterSchema::Boolean),
        "null" => Ok(ParameterSchema::Null),
        "array" => {
            let items = match node.get("items") {
                Some(items) => convert_child(items, options, depth + 1),
                None => ParameterSchema::Any,
            };
            Ok(ParameterSchema::Array {
                items: Box::new(items),
                min_items: read_count(node, "minItems")?,
                max_items: read_count(node, "maxItems")?,
            })
        }
        "object" => convert_object(node, options, depth),
        other => {
            debug!(kind = %other, "Unsupported JSON schema type, accepting any value");
            Ok(ParameterSchema::Any)
        }
    }
}

fn convert_object(
    node: &Map<String, Value>,
    options: ConvertOptions,
    depth: usize,
) -> Result<ParameterSchema, String> {
    let properties = match node.get("properties") {
        Some(Value::Object(properties)) => properties,
        Some(Value::Null) | None => return Ok(ParameterSchema::Object(ObjectSchema::permissive())),
        Some(other) => {
            return Err(format!(
                "\"properties\" must be an object, got {}",
                super::json_type_name(other)
            ))
        }
    };

    let required: Vec<&str> = match node.get("required") {
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let fields: Vec<Field> = properties
        .iter()
        .map(|(name, property)| Field {
            name: name.clone(),
            schema: convert_child(property, options, depth + 1),
            required: required.contains(&name.as_str()) && !has_default(property),
            description: property
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect();

    if fields.is_empty() {
        return Ok(ParameterSchema::Object(ObjectSchema::permissive()));
    }

    let all_optional = fields.iter().all(|field| !field.required);
    let declares_extra = node
        .get("additionalProperties")
        .is_some_and(|extra| !matches!(extra, Value::Bool(false)));
    Ok(ParameterSchema::Object(ObjectSchema {
        passthrough: declares_extra || (all_optional && options.passthrough_all_optional),
        fields,
    }))
}

/// Converts a nested node, confining any failure to that node.
fn convert_child(schema: &Value, options: ConvertOptions, depth: usize) -> ParameterSchema {
    match convert_node(schema, options, depth) {
        Ok(converted) => converted,
        Err(reason) => {
            debug!(reason = %reason, "Nested JSON schema node could not be converted");
            ParameterSchema::Any
        }
    }
}

fn string_enum(node: &Map<String, Value>) -> Result<ParameterSchema, String> {
    let Some(Value::Array(values)) = node.get("enum") else {
        return Err("\"enum\" must be an array".to_string());
    };
    let options = values
        .iter()
        .map(|value| match value {
            Value::String(text) => Ok(text.clone()),
            other => Err(format!("non-string enum value: {other}")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if options.is_empty() {
        return Err("\"enum\" must not be empty".to_string());
    }
    Ok(ParameterSchema::Enum(options))
}

fn has_default(property: &Value) -> bool {
    property
        .as_object()
        .is_some_and(|node| node.contains_key("default"))
}

fn read_count(node: &Map<String, Value>, key: &str) -> Result<Option<usize>, String> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|count| usize::try_from(count).ok())
            .map(Some)
            .ok_or_else(|| format!("\"{key}\" must be a non-negative integer")),
    }
}

fn read_bound(node: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("\"{key}\" must be a number")),
    }
}

fn error_fallback(reason: &str) -> ParameterSchema {
    ParameterSchema::Object(ObjectSchema {
        fields: vec![Field {
            name: COMPAT_FIELD.to_string(),
            schema: ParameterSchema::Any,
            required: false,
            description: Some(format!(
                "Parameter schema could not be converted ({reason}); any arguments are accepted"
            )),
        }],
        passthrough: true,
    })
}
