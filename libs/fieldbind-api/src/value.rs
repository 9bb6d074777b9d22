use std::any::Any;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered string-keyed mapping, the normalized form of every binding source.
pub type Map = indexmap::IndexMap<String, Value>;

/// Dynamic value flowing from a source into destination fields.
///
/// Strategy by type:
/// - Scalars (Int, UInt, Float, Bool): converted per destination field
/// - String, Bytes: may also carry JSON text that decodes into Array/Map
/// - Time: always UTC, naive destinations drop the zone
/// - Array, Map: recursive, Map preserves source key order
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Raw bytes, not necessarily UTF-8.
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Array(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short lowercase name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Time(_) => "time",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Text payload of string and byte values.
    pub fn text_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The Rust value carried by this variant.
    ///
    /// Custom converters registered for a source type are looked up by the
    /// payload's type: `i64` for `Int`, `String` for `String`, `Map` for `Map`
    /// and so on. `Null` carries `()`.
    pub fn payload(&self) -> &dyn Any {
        match self {
            Value::Null => &(),
            Value::Bool(v) => v,
            Value::Int(v) => v,
            Value::UInt(v) => v,
            Value::Float(v) => v,
            Value::String(v) => v,
            Value::Bytes(v) => v,
            Value::Time(v) => v,
            Value::Array(v) => v,
            Value::Map(v) => v,
        }
    }

    /// Decode JSON text held by a string or byte value.
    ///
    /// Returns `None` for any other variant or when the text is not JSON.
    pub fn decode_json(&self) -> Option<Value> {
        let bytes = self.text_bytes()?;
        serde_json::from_slice::<serde_json::Value>(bytes)
            .ok()
            .map(Value::from)
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(*v),
            Value::Int(v) => Json::from(*v),
            Value::UInt(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::String(v) => Json::String(v.clone()),
            Value::Bytes(v) => match std::str::from_utf8(v) {
                Ok(text) => Json::String(text.to_string()),
                Err(_) => Json::Array(v.iter().map(|b| Json::from(*b)).collect()),
            },
            Value::Time(v) => Json::String(v.to_rfc3339()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Build a `Value::Map` from `key => value` pairs.
///
/// ```ignore
/// let source = map! { "id" => 7, "name" => "john", "address" => map! { "zip" => "1000" } };
/// ```
#[macro_export]
macro_rules! map {
    () => {
        $crate::Value::Map($crate::value::Map::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::Map::new();
        $( map.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        $crate::Value::Map(map)
    }};
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

macro_rules! from_signed {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(v as i64)
            }
        }
    )*};
}

macro_rules! from_unsigned {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::UInt(v as u64)
            }
        }
    )*};
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Time(v.and_utc())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(obj) => Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_keeps_nested_shape() {
        let value: Value = serde_json::from_str(r#"{"id": 7, "tags": ["a", "b"], "ratio": 0.5}"#).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["id"], Value::Int(7));
        assert_eq!(map["tags"], Value::Array(vec!["a".into(), "b".into()]));
        assert_eq!(map["ratio"], Value::Float(0.5));
    }

    #[test]
    fn map_macro_preserves_insertion_order() {
        let value = map! { "b" => 1, "a" => "x", "c" => Value::Null };
        let keys: Vec<&str> = value.as_map().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn payload_exposes_inner_type() {
        assert!(Value::Int(3).payload().is::<i64>());
        assert!(Value::from("x").payload().is::<String>());
        assert!(Value::Null.payload().is::<()>());
    }

    #[test]
    fn decode_json_only_reads_text() {
        assert_eq!(Value::from("[1,2]").decode_json(), Some(Value::Array(vec![1i64.into(), 2i64.into()])));
        assert_eq!(Value::from("not json").decode_json(), None);
        assert_eq!(Value::Int(1).decode_json(), None);
    }

    #[test]
    fn to_json_renders_non_utf8_bytes_as_numbers() {
        assert_eq!(Value::Bytes(vec![0xff, 1]).to_json(), serde_json::json!([255, 1]));
        assert_eq!(Value::Bytes(b"hi".to_vec()).to_json(), serde_json::json!("hi"));
    }
}
