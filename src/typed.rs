//! Typed column names.
//!
//! A document field keeps one physical column per JSON type it has been seen
//! with. The type travels in the column name as a trailing tag segment:
//!
//! | Type    | Tag  | Example        |
//! |---------|------|----------------|
//! | boolean | `$B` | `a.flag.$B`    |
//! | integer | `$I` | `a.count.$I`   |
//! | number  | `$N` | `a.ratio.$N`   |
//! | string  | `$S` | `a.name.$S`    |
//! | object  | `$O` | structural     |
//! | array   | `$A` | structural     |
//! | exists  | `$E` | structural     |
//!
//! User keys that start with `$` are escaped at ingestion (see [`crate::fields`]),
//! so a tag segment is never ambiguous.

use crate::fields::{concat_field, split_raw, ROOT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The JSON value kinds a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
    Exists,
}

impl JsonType {
    pub const ALL: [JsonType; 7] = [
        JsonType::Boolean,
        JsonType::Integer,
        JsonType::Number,
        JsonType::String,
        JsonType::Object,
        JsonType::Array,
        JsonType::Exists,
    ];

    /// The tag appended to a typed column name.
    pub fn tag(&self) -> &'static str {
        match self {
            JsonType::Boolean => "$B",
            JsonType::Integer => "$I",
            JsonType::Number => "$N",
            JsonType::String => "$S",
            JsonType::Object => "$O",
            JsonType::Array => "$A",
            JsonType::Exists => "$E",
        }
    }

    /// Look a tag up.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// The type of a document value; `None` for null.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(JsonType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(JsonType::Integer),
            Value::Number(_) => Some(JsonType::Number),
            Value::String(_) => Some(JsonType::String),
            Value::Array(_) => Some(JsonType::Array),
            Value::Object(_) => Some(JsonType::Object),
        }
    }

    /// Object, array and exists markers have no physical column.
    pub fn is_structural(&self) -> bool {
        matches!(self, JsonType::Object | JsonType::Array | JsonType::Exists)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, JsonType::Integer | JsonType::Number)
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Exists => "exists",
        };
        f.write_str(name)
    }
}

/// Physical column name for a logical field of the given type.
///
/// ```
/// use snowdoc::typed::{encode, JsonType};
///
/// assert_eq!(encode("a.b", JsonType::Number), "a.b.$N");
/// assert_eq!(encode(".", JsonType::String), "$S");
/// ```
pub fn encode(name: &str, json_type: JsonType) -> String {
    concat_field(name, json_type.tag())
}

/// Split a physical column name into its logical name and type tag.
///
/// Untyped names (bookkeeping columns such as `__id__`) decode to `None`.
pub fn decode(es_column: &str) -> (String, Option<JsonType>) {
    let segments = split_raw(es_column);
    match segments.split_last() {
        Some((last, rest)) => match JsonType::from_tag(last) {
            Some(json_type) => {
                let name = if rest.is_empty() {
                    ROOT.to_string()
                } else {
                    rest.join(".")
                };
                (name, Some(json_type))
            }
            None => (es_column.to_string(), None),
        },
        None => (ROOT.to_string(), None),
    }
}

/// Strip every tag segment from a typed path.
pub fn untype_field(name: &str) -> String {
    let segments: Vec<&str> = split_raw(name)
        .into_iter()
        .filter(|s| JsonType::from_tag(s).is_none())
        .collect();
    if segments.is_empty() {
        ROOT.to_string()
    } else {
        segments.join(".")
    }
}

/// Convert a value read back from storage into the JSON type of its column.
///
/// Engines without a native boolean hand back integers, and some hand back
/// integral floats for integer columns.
pub fn coerce(value: Value, json_type: JsonType) -> Value {
    match (json_type, value) {
        (JsonType::Boolean, Value::Number(n)) => {
            Value::Bool(n.as_i64().map(|i| i != 0).unwrap_or_else(|| n.as_f64() != Some(0.0)))
        }
        (JsonType::Boolean, Value::String(s)) => match s.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::String(s),
        },
        (JsonType::Integer, Value::Number(n)) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 => Value::from(f as i64),
            _ => Value::Number(n),
        },
        (JsonType::Integer, Value::Bool(b)) => Value::from(b as i64),
        (JsonType::Number, Value::Bool(b)) => Value::from(b as i64),
        (_, value) => value,
    }
}
