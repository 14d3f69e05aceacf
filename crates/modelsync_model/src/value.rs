//! Dynamic field value type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamic field value.
///
/// Records are type-erased, so every field is stored as one of these
/// variants. Matching on `Value` replaces runtime casts: callers must handle
/// every shape a field can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    /// Null or absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Point in time, in milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested object keyed by field name.
    Nested(BTreeMap<String, Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a double. Integers are widened.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as epoch milliseconds, if it is a timestamp.
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Get this value as a nested object, if it is one.
    pub fn as_nested(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Nested(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in this nested value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_nested().and_then(|m| m.get(key))
    }

    /// Returns the identifier form of this value.
    ///
    /// Only scalar values can take part in a record identifier.
    pub fn identifier_part(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(n) | Value::Timestamp(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Double(_) | Value::Null | Value::List(_) | Value::Nested(_) => None,
        }
    }

    /// Converts a JSON document into a value.
    ///
    /// Integral numbers become [`Value::Int`], every other number becomes
    /// [`Value::Double`]. Timestamps cannot be told apart from integers in
    /// JSON; schema-aware conversion happens in [`crate::Record::from_json`].
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Nested(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts this value into a JSON document.
    ///
    /// Non-finite doubles have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) | Value::Timestamp(n) => serde_json::Value::from(*n),
            Value::Double(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Nested(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Nested(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_bool(), None);

        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Int(42).as_double(), Some(42.0));
        assert_eq!(Value::String("42".into()).as_int(), None);

        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Timestamp(1_000).as_timestamp(), Some(1_000));
        assert_eq!(Value::Int(1_000).as_timestamp(), None);
    }

    #[test]
    fn nested_get() {
        let mut inner = BTreeMap::new();
        inner.insert("city".to_string(), Value::from("Lisbon"));
        let nested = Value::Nested(inner);

        assert_eq!(nested.get("city"), Some(&Value::from("Lisbon")));
        assert_eq!(nested.get("street"), None);
        assert_eq!(Value::Int(1).get("city"), None);
    }

    #[test]
    fn identifier_parts() {
        assert_eq!(Value::from("abc").identifier_part(), Some("abc".into()));
        assert_eq!(Value::Int(7).identifier_part(), Some("7".into()));
        assert_eq!(Value::Null.identifier_part(), None);
        assert_eq!(Value::Double(1.5).identifier_part(), None);
    }

    #[test]
    fn json_conversion() {
        let doc = json!({
            "title": "hello",
            "rating": 4,
            "score": 0.5,
            "draft": false,
            "tags": ["a", "b"],
            "author": { "name": "Ada" },
            "cover": null
        });

        let value = Value::from_json(doc.clone());
        assert_eq!(value.get("title"), Some(&Value::from("hello")));
        assert_eq!(value.get("rating"), Some(&Value::Int(4)));
        assert_eq!(value.get("score"), Some(&Value::Double(0.5)));
        assert_eq!(value.get("draft"), Some(&Value::Bool(false)));
        assert_eq!(
            value.get("tags"),
            Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(
            value.get("author").and_then(|a| a.get("name")),
            Some(&Value::from("Ada"))
        );
        assert_eq!(value.get("cover"), Some(&Value::Null));

        assert_eq!(value.to_json(), doc);
    }

    #[test]
    fn timestamp_serializes_as_number() {
        assert_eq!(Value::Timestamp(1_700_000_000_000).to_json(), json!(1_700_000_000_000i64));
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(1.5f64), Value::Double(1.5));
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
