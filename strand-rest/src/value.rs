//! Parameter value encoding.
//!
//! Path segments and query strings carry the compact REST-string form:
//! scalars render bare (`true`, `42`, `hello` unquoted), anything else
//! renders as its JSON text. Request bodies carry plain JSON. The
//! [`RestValue`] tag records which form a received parameter came in as, so
//! typed extraction can decode accordingly.

use crate::error::{RestError, RestResult};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A parameter value as received by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum RestValue {
    /// Raw text from a path placeholder or the query string.
    Scalar(String),
    /// A JSON value from the request body (or a substituted default).
    Json(Value),
}

impl RestValue {
    /// Decode into the target type.
    ///
    /// Scalar text is parsed as the target type first (numbers, booleans,
    /// JSON-encoded composites) and falls back to a bare string.
    pub fn decode<T: DeserializeOwned>(&self) -> RestResult<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value.clone()).map_err(RestError::from),
            Self::Scalar(text) => serde_json::from_str(text).or_else(|_| {
                serde_json::from_value(Value::String(text.clone())).map_err(RestError::from)
            }),
        }
    }
}

/// Whether a JSON value has a bare scalar text form.
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Compact text form of a JSON value: scalars bare, anything else as JSON
/// text.
pub fn rest_text(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serialize a typed value into `(json, already_json)`, where the flag marks
/// values with no bare scalar form.
pub fn to_tagged<T: Serialize>(value: &T) -> RestResult<(Value, bool)> {
    let value = serde_json::to_value(value)?;
    let already_json = !is_scalar(&value);
    Ok((value, already_json))
}
