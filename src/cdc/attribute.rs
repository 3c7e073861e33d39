//! DynamoDB attribute values and their decoding into plain JSON.
//!
//! Stream images arrive in DynamoDB's wire format, where every value is a
//! single-key object naming its type:
//!
//! ```text
//! {"id": {"S": "abc"}, "count": {"N": "5"}, "tags": {"SS": ["a", "b"]}}
//! ```
//!
//! [`AttributeValue`] is the parsed form of one such object and [`decode`]
//! turns it into the value a row store expects:
//!
//! ```text
//! {"id": "abc", "count": 5, "tags": ["a", "b"]}
//! ```
//!
//! Decoding never fails. Anything the decoder does not understand (an
//! unknown tag, a payload of the wrong shape, an unparseable number) decodes
//! to nothing, and callers treat an empty result as "skip this record".

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};

/// One DynamoDB wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// `{"NULL": true}`
    Null,
    /// `{"S": "text"}`
    S(String),
    /// `{"BOOL": true}`
    Bool(bool),
    /// `{"N": "42"}`; numbers travel as strings.
    N(String),
    /// `{"M": {...}}`, in document order.
    M(Vec<(String, AttributeValue)>),
    /// `{"L": [...]}`
    L(Vec<AttributeValue>),
    /// `{"BS": [...]}`; elements are decoded exactly like `L` elements.
    Bs(Vec<AttributeValue>),
    /// `{"SS": ["a", "b"]}`
    Ss(Vec<String>),
    /// `{"NS": ["1", "2.5"]}`
    Ns(Vec<String>),
    /// Tag not handled here (`B`, typos, wrong payload shape, non-objects).
    Unrecognized(String),
}

impl AttributeValue {
    /// Parse a wire value from JSON.
    ///
    /// The first recognized tag in document order wins. A recognized tag
    /// whose payload has the wrong JSON shape is reported as unrecognized.
    pub fn from_json(value: &Value) -> Self {
        let Value::Object(fields) = value else {
            return Self::Unrecognized(json_kind(value).to_string());
        };

        for (tag, payload) in fields {
            if let Some(parsed) = Self::from_tagged(tag, payload) {
                return parsed;
            }
        }

        let tag = fields.keys().next().map(String::as_str).unwrap_or("");
        Self::Unrecognized(tag.to_string())
    }

    /// Parse an attribute map (`Keys`, `NewImage`) as an `M` value.
    pub fn map_from_json(fields: &Map<String, Value>) -> Self {
        Self::M(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), Self::from_json(value)))
                .collect(),
        )
    }

    fn from_tagged(tag: &str, payload: &Value) -> Option<Self> {
        let parsed = match tag {
            "NULL" => Self::Null,
            "S" => Self::S(payload.as_str()?.to_string()),
            "BOOL" => Self::Bool(payload.as_bool()?),
            "N" => Self::N(payload.as_str()?.to_string()),
            "M" => Self::map_from_json(payload.as_object()?),
            "L" => Self::L(payload.as_array()?.iter().map(Self::from_json).collect()),
            "BS" => Self::Bs(payload.as_array()?.iter().map(Self::from_json).collect()),
            "SS" => Self::Ss(string_items(payload)?),
            "NS" => Self::Ns(string_items(payload)?),
            _ => return None,
        };
        Some(parsed)
    }

    /// Wire tag of this value, for diagnostics.
    pub fn tag(&self) -> &str {
        match self {
            Self::Null => "NULL",
            Self::S(_) => "S",
            Self::Bool(_) => "BOOL",
            Self::N(_) => "N",
            Self::M(_) => "M",
            Self::L(_) => "L",
            Self::Bs(_) => "BS",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Unrecognized(tag) => tag,
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

fn string_items(payload: &Value) -> Option<Vec<String>> {
    payload
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a wire value into plain JSON.
///
/// Returns `None` for `NULL` and for anything unrecognized. Inside maps and
/// sequences an absent value is kept as JSON `null` so the container keeps
/// its shape.
pub fn decode(value: &AttributeValue) -> Option<Value> {
    match value {
        AttributeValue::Null => None,
        AttributeValue::S(s) => Some(Value::String(s.clone())),
        AttributeValue::Bool(b) => Some(Value::Bool(*b)),
        AttributeValue::N(n) => to_number(n).map(Value::Number),
        AttributeValue::M(fields) => Some(Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), decode(v).unwrap_or(Value::Null)))
                .collect(),
        )),
        AttributeValue::L(items) | AttributeValue::Bs(items) => Some(Value::Array(
            items
                .iter()
                .map(|v| decode(v).unwrap_or(Value::Null))
                .collect(),
        )),
        AttributeValue::Ss(items) => Some(Value::Array(
            items.iter().cloned().map(Value::String).collect(),
        )),
        AttributeValue::Ns(items) => Some(Value::Array(
            items
                .iter()
                .map(|n| to_number(n).map(Value::Number).unwrap_or(Value::Null))
                .collect(),
        )),
        AttributeValue::Unrecognized(_) => None,
    }
}

/// Decode an attribute map into a document.
///
/// Convenience for `Keys` / `NewImage`, which always decode to an object
/// (possibly empty).
pub fn decode_map(fields: &Map<String, Value>) -> Map<String, Value> {
    match decode(&AttributeValue::map_from_json(fields)) {
        Some(Value::Object(document)) => document,
        _ => Map::new(),
    }
}

/// Two-tier numeric coercion: integer when the text is an integer,
/// floating point otherwise.
fn to_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Number::from(u));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}
