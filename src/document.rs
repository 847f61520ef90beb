use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Conversion to and from the generic (JSON-shaped) configuration document.
///
/// Reading is total over absent fields: a missing key, an explicit `null` or a missing
/// sub-document all resolve to the field's default. Only a value of the wrong JSON type is an
/// error.
pub trait DocumentCodec: Sized {
    fn from_document(doc: &Value) -> Result<Self, DocumentError>;
    fn to_document(&self) -> Value;
}

#[derive(Debug)]
pub enum DocumentError {
    Json(serde_json::Error),
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(f, "invalid document: {e}"),
            Self::InvalidField { field, reason } => {
                write!(f, "invalid document field {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::InvalidField { .. } => None,
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Deserializes a flat settings struct whose fields all carry `#[serde(default)]`.
pub(crate) fn decode<T: DeserializeOwned>(doc: &Value) -> Result<T, DocumentError> {
    Ok(serde_json::from_value(strip_nulls(doc))?)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Value {
    // Plain structs of strings, numbers and bools always serialize.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Returns a copy of `doc` with every `null` object member removed. A non-object top level
/// (including `null` itself) becomes an empty object.
pub(crate) fn strip_nulls(doc: &Value) -> Value {
    match doc {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls_inner(v)))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

fn strip_nulls_inner(value: &Value) -> Value {
    match value {
        Value::Object(_) => strip_nulls(value),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls_inner).collect()),
        other => other.clone(),
    }
}

/// First element of the array stored under `key`, or `Value::Null` when absent.
pub(crate) fn first_of<'a>(doc: &'a Value, key: &str) -> &'a Value {
    doc.get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .unwrap_or(&Value::Null)
}

pub(crate) fn opt_string(
    doc: &Value,
    key: &str,
    field: &'static str,
) -> Result<Option<String>, DocumentError> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(wrong_type(field, "string", other)),
    }
}

pub(crate) fn opt_port(doc: &Value, key: &str) -> Result<Option<u16>, DocumentError> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| DocumentError::InvalidField {
                field: "port",
                reason: format!("{n} is not in 0..=65535"),
            }),
        Some(other) => Err(wrong_type("port", "integer", other)),
    }
}

pub(crate) fn opt_bool(
    doc: &Value,
    key: &str,
    field: &'static str,
) -> Result<Option<bool>, DocumentError> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(wrong_type(field, "bool", other)),
    }
}

pub(crate) fn opt_u8(
    doc: &Value,
    key: &str,
    field: &'static str,
) -> Result<Option<u8>, DocumentError> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| DocumentError::InvalidField {
                field,
                reason: format!("{n} is out of range"),
            }),
        Some(other) => Err(wrong_type(field, "integer", other)),
    }
}

fn wrong_type(field: &'static str, expected: &str, got: &Value) -> DocumentError {
    let got = match got {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    DocumentError::InvalidField {
        field,
        reason: format!("expected {expected}, got {got}"),
    }
}

/// Inserts `key` only when `value` is present.
pub(crate) fn put_opt<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        map.insert(key.to_string(), encode(&value));
    }
}
