//! Expressions.
//!
//! Each variant has exactly one wire fragment, produced by [`ToJson`]. Literal
//! scalars serialize as plain JSON, everything else as a keyed object such as
//! `{"xt:lvar": "x"}`.
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::binding::Binding;
use crate::errors::{EncodeError, Result};
use crate::json::{TIMESTAMPTZ_TAG, ToJson, UUID_TAG, format_timestamp, tagged};
use crate::query::Query;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
    /// Reference to a logic variable.
    Sym(String),
    /// Reference to a query parameter.
    Param(String),
    Date(DateTime<FixedOffset>),
    Uuid(Uuid),
    Call {
        f: String,
        args: Vec<Expr>,
    },
    Get {
        expr: Box<Expr>,
        field: String,
    },
    /// Scalar sub-query.
    Subquery {
        query: Box<Query>,
        args: Vec<Binding>,
    },
    Exists {
        query: Box<Query>,
        args: Vec<Binding>,
    },
    Pull {
        query: Box<Query>,
        args: Vec<Binding>,
    },
    PullMany {
        query: Box<Query>,
        args: Vec<Binding>,
    },
    List(Vec<Expr>),
    Map(IndexMap<String, Expr>),
}

pub fn sym(name: impl Into<String>) -> Expr {
    Expr::Sym(name.into())
}

pub fn param(name: impl Into<String>) -> Expr {
    Expr::Param(name.into())
}

pub fn lit(s: impl Into<String>) -> Expr {
    Expr::Str(s.into())
}

pub fn date(t: impl Into<DateTime<FixedOffset>>) -> Expr {
    Expr::Date(t.into())
}

pub fn uuid(id: Uuid) -> Expr {
    Expr::Uuid(id)
}

pub fn call(f: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call {
        f: f.into(),
        args: args.into_iter().collect(),
    }
}

pub fn get(expr: Expr, field: impl Into<String>) -> Expr {
    Expr::Get {
        expr: Box::new(expr),
        field: field.into(),
    }
}

pub fn subquery<B: Into<Binding>>(
    query: impl Into<Query>,
    args: impl IntoIterator<Item = B>,
) -> Expr {
    Expr::Subquery {
        query: Box::new(query.into()),
        args: args.into_iter().map(Into::into).collect(),
    }
}

pub fn exists<B: Into<Binding>>(
    query: impl Into<Query>,
    args: impl IntoIterator<Item = B>,
) -> Expr {
    Expr::Exists {
        query: Box::new(query.into()),
        args: args.into_iter().map(Into::into).collect(),
    }
}

pub fn pull<B: Into<Binding>>(
    query: impl Into<Query>,
    args: impl IntoIterator<Item = B>,
) -> Expr {
    Expr::Pull {
        query: Box::new(query.into()),
        args: args.into_iter().map(Into::into).collect(),
    }
}

pub fn pull_many<B: Into<Binding>>(
    query: impl Into<Query>,
    args: impl IntoIterator<Item = B>,
) -> Expr {
    Expr::PullMany {
        query: Box::new(query.into()),
        args: args.into_iter().map(Into::into).collect(),
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Bool(b)
    }
}

impl From<i64> for Expr {
    fn from(i: i64) -> Self {
        Expr::Long(i)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        Expr::Double(f)
    }
}

impl From<DateTime<FixedOffset>> for Expr {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Expr::Date(t)
    }
}

impl From<DateTime<Utc>> for Expr {
    fn from(t: DateTime<Utc>) -> Self {
        Expr::Date(t.fixed_offset())
    }
}

impl From<Uuid> for Expr {
    fn from(id: Uuid) -> Self {
        Expr::Uuid(id)
    }
}

fn subquery_json(key: &str, query: &Query, args: &[Binding]) -> Result<JsonValue> {
    let mut out = serde_json::Map::with_capacity(2);
    out.insert(key.to_string(), query.to_json()?);
    out.insert("args".to_string(), args.to_json()?);
    Ok(JsonValue::Object(out))
}

impl ToJson for Expr {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(match self {
            Expr::Null => JsonValue::Null,
            Expr::Bool(b) => JsonValue::Bool(*b),
            Expr::Long(i) => JsonValue::from(*i),
            Expr::Double(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| EncodeError::NotEncodable(format!("non-finite float {f}")))?,
            Expr::Str(s) => JsonValue::String(s.clone()),
            Expr::Sym(name) => json!({"xt:lvar": name}),
            Expr::Param(name) => json!({"xt:param": name}),
            Expr::Date(t) => tagged(TIMESTAMPTZ_TAG, format_timestamp(t)),
            Expr::Uuid(id) => tagged(UUID_TAG, id.to_string()),
            Expr::Call { f, args } => json!({"xt:call": f, "args": args.to_json()?}),
            Expr::Get { expr, field } => json!({"xt:get": expr.to_json()?, "field": field}),
            Expr::Subquery { query, args } => subquery_json("xt:q", query, args)?,
            Expr::Exists { query, args } => subquery_json("xt:exists", query, args)?,
            Expr::Pull { query, args } => subquery_json("xt:pull", query, args)?,
            Expr::PullMany { query, args } => subquery_json("xt:pullMany", query, args)?,
            Expr::List(exprs) => exprs.to_json()?,
            Expr::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                JsonValue::Object(out)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::query::{FromTable, Where};

    #[test]
    fn simple_fragments() {
        assert_eq!(json!({"xt:lvar": "a"}), sym("a").to_json().unwrap());
        assert_eq!(json!({"xt:param": "$id"}), param("$id").to_json().unwrap());
        assert_eq!(json!("foo"), lit("foo").to_json().unwrap());
        assert_eq!(json!(12), Expr::Long(12).to_json().unwrap());

        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            json!({"@type": "xt:timestamptz", "@value": "2024-01-01T00:00:00Z"}),
            date(t).to_json().unwrap()
        );
    }

    #[test]
    fn call_and_get() {
        let e = call("+", [sym("a"), Expr::Long(1)]);
        assert_eq!(
            json!({"xt:call": "+", "args": [{"xt:lvar": "a"}, 1]}),
            e.to_json().unwrap()
        );

        let e = get(sym("doc"), "name");
        assert_eq!(
            json!({"xt:get": {"xt:lvar": "doc"}, "field": "name"}),
            e.to_json().unwrap()
        );
    }

    #[test]
    fn subquery_fragments() {
        let inner = Query::pipeline(
            FromTable::new("orders").binding(["customer"]),
            [Where::new([call("=", [sym("customer"), param("c")])]).into()],
        );

        let e = exists(inner.clone(), [("c", sym("id"))]);
        let json = e.to_json().unwrap();
        assert_eq!(json!([{"c": {"xt:lvar": "id"}}]), json["args"]);
        assert!(json["xt:exists"].is_array());

        let e = pull_many(inner, Vec::<Binding>::new());
        let json = e.to_json().unwrap();
        assert_eq!(json!([]), json["args"]);
        assert!(json.get("xt:pullMany").is_some());
    }
}
