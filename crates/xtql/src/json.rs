//! JSON-LD wire codec.
//!
//! Special values travel as `{"@type": <tag>, "@value": <string>}` objects.
//! Encoding goes through [`ToJson`]; decoding is an explicit recursive walk
//! over parsed JSON producing native [`Value`]s.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::trace;
use uuid::Uuid;

use crate::errors::{DecodeError, Result};
use crate::value::Value;

pub const TYPE_KEY: &str = "@type";
pub const VALUE_KEY: &str = "@value";

pub const UUID_TAG: &str = "xt:uuid";
pub const TIMESTAMPTZ_TAG: &str = "xt:timestamptz";
pub const ERROR_TAG: &str = "xt:error";

const ERROR_MESSAGE_KEY: &str = "xtdb.error/message";

/// Anything that has a wire JSON fragment.
pub trait ToJson {
    fn to_json(&self) -> Result<JsonValue>;
}

impl<T: ToJson> ToJson for [T] {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(JsonValue::Array(
            self.iter().map(ToJson::to_json).collect::<Result<_>>()?,
        ))
    }
}

impl<T: ToJson> ToJson for Vec<T> {
    fn to_json(&self) -> Result<JsonValue> {
        self.as_slice().to_json()
    }
}

/// Encode a model object to canonical JSON text.
pub fn to_string<T: ToJson + ?Sized>(value: &T) -> Result<String> {
    let json = value.to_json()?;
    Ok(serde_json::to_string(&json)?)
}

/// How a server-reported `xt:error` object is treated while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Fail decoding with the server message.
    #[default]
    Strict,
    /// Keep the raw tagged object as a plain map.
    Lenient,
}

pub(crate) fn tagged(tag: &str, value: String) -> JsonValue {
    let mut obj = serde_json::Map::with_capacity(2);
    obj.insert(TYPE_KEY.to_string(), JsonValue::String(tag.to_string()));
    obj.insert(VALUE_KEY.to_string(), JsonValue::String(value));
    JsonValue::Object(obj)
}

/// Format a timestamp as ISO-8601, using `Z` for UTC.
pub fn format_timestamp(t: &DateTime<FixedOffset>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Fractional seconds are optional and a trailing zone annotation such as
/// `[UTC]` or `[Europe/London]` is ignored in favor of the numeric offset.
/// Timestamps without an offset, and bare dates, are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    let trimmed = s.trim();
    let without_zone = match trimmed.find('[') {
        Some(idx) if trimmed.ends_with(']') => &trimmed[..idx],
        _ => trimmed,
    };

    if let Ok(t) = DateTime::parse_from_rfc3339(without_zone) {
        return Ok(t);
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(without_zone, fmt) {
            return Ok(t.and_utc().fixed_offset());
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(without_zone, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc().fixed_offset());
        }
    }

    Err(DecodeError::InvalidTimestamp(s.to_string()))
}

/// Decode parsed JSON into a native value.
pub fn decode(json: JsonValue, mode: ErrorMode) -> Result<Value, DecodeError> {
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::String(s),
        JsonValue::Array(vals) => Value::List(
            vals.into_iter()
                .map(|v| decode(v, mode))
                .collect::<Result<_, _>>()?,
        ),
        JsonValue::Object(obj) if obj.contains_key(TYPE_KEY) => decode_tagged(obj, mode)?,
        JsonValue::Object(obj) => {
            let mut map = IndexMap::with_capacity(obj.len());
            for (k, v) in obj {
                map.insert(k, decode(v, mode)?);
            }
            Value::Map(map)
        }
    })
}

fn decode_tagged(
    mut obj: serde_json::Map<String, JsonValue>,
    mode: ErrorMode,
) -> Result<Value, DecodeError> {
    let tag = match obj.get(TYPE_KEY) {
        Some(JsonValue::String(tag)) => tag.clone(),
        Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
        None => return Err(DecodeError::UnknownType(String::new())),
    };
    trace!(%tag, "decoding tagged value");

    match tag.as_str() {
        UUID_TAG => {
            let s = tagged_string(&mut obj, &tag)?;
            let id = Uuid::parse_str(&s).map_err(|source| DecodeError::InvalidUuid {
                value: s.clone(),
                source,
            })?;
            Ok(Value::Uuid(id))
        }
        TIMESTAMPTZ_TAG => {
            let s = tagged_string(&mut obj, &tag)?;
            Ok(Value::Timestamp(parse_timestamp(&s)?))
        }
        ERROR_TAG => match mode {
            ErrorMode::Strict => {
                let data = obj.remove(VALUE_KEY);
                let message = match &data {
                    Some(JsonValue::Object(v)) => match v.get(ERROR_MESSAGE_KEY) {
                        Some(JsonValue::String(m)) => m.clone(),
                        _ => JsonValue::Object(v.clone()).to_string(),
                    },
                    Some(JsonValue::String(m)) => m.clone(),
                    Some(other) => other.to_string(),
                    None => "unknown server error".to_string(),
                };
                Err(DecodeError::Server { message, data })
            }
            ErrorMode::Lenient => decode(JsonValue::Object(strip_type(obj)), mode)
                .map(|v| match v {
                    Value::Map(mut m) => {
                        m.shift_insert(0, TYPE_KEY.to_string(), Value::String(tag.clone()));
                        Value::Map(m)
                    }
                    other => other,
                }),
        },
        _ => Err(DecodeError::UnknownType(tag)),
    }
}

/// Remove the tag so the remainder decodes as a plain map.
fn strip_type(mut obj: serde_json::Map<String, JsonValue>) -> serde_json::Map<String, JsonValue> {
    obj.remove(TYPE_KEY);
    obj
}

fn tagged_string(
    obj: &mut serde_json::Map<String, JsonValue>,
    tag: &str,
) -> Result<String, DecodeError> {
    match obj.remove(VALUE_KEY) {
        Some(JsonValue::String(s)) => Ok(s),
        _ => Err(DecodeError::MissingValue(tag.to_string())),
    }
}

/// Parse and decode a single JSON document.
pub fn decode_str(text: &str, mode: ErrorMode) -> Result<Value, DecodeError> {
    let json: JsonValue = serde_json::from_str(text)?;
    decode(json, mode)
}

/// Parse and decode a body holding either one JSON array or newline
/// delimited JSON documents.
pub fn decode_documents(text: &str, mode: ErrorMode) -> Result<Vec<Value>, DecodeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return match decode_str(trimmed, mode)? {
            Value::List(vals) => Ok(vals),
            other => Ok(vec![other]),
        };
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| decode_str(line, mode))
        .collect()
}
