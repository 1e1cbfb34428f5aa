//! Native values exchanged with the server.
//!
//! Values appear on both sides of the wire: as literals inside documents and
//! argument rows when encoding, and as the decoded contents of result rows.
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::errors::{EncodeError, Result};
use crate::json::{TIMESTAMPTZ_TAG, ToJson, UUID_TAG, format_timestamp, tagged};

/// A single result row or document, keyed by field name in insertion order.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    Timestamp(DateTime<FixedOffset>),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// Coarse classification of a value, used for column descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Uuid,
    Timestamp,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
        };
        write!(f, "{s}")
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// Encode to wire JSON.
///
/// UUIDs and timestamps are rewritten to their `@type`/`@value` tagged form.
/// Non-finite floats have no JSON representation and are rejected.
impl ToJson for Value {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| EncodeError::NotEncodable(format!("non-finite float {f}")))?,
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Uuid(u) => tagged(UUID_TAG, u.to_string()),
            Self::Timestamp(t) => tagged(TIMESTAMPTZ_TAG, format_timestamp(t)),
            Self::List(vals) => JsonValue::Array(
                vals.iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Map(map) => JsonValue::Object(map_to_json(map)?),
        })
    }
}

pub(crate) fn map_to_json(
    map: &IndexMap<String, Value>,
) -> Result<serde_json::Map<String, JsonValue>> {
    let mut out = serde_json::Map::with_capacity(map.len());
    for (k, v) in map {
        out.insert(k.clone(), v.to_json()?);
    }
    Ok(out)
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

macro_rules! value_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(i64, Int);
value_from!(i32, Int);
value_from!(u32, Int);
value_from!(f64, Float);
value_from!(String, String);
value_from!(&str, String);
value_from!(Uuid, Uuid);
value_from!(DateTime<FixedOffset>, Timestamp);
value_from!(IndexMap<String, Value>, Map);

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.fixed_offset())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
