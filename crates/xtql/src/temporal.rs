//! Temporal filters over valid time and system time.
use serde_json::{Value as JsonValue, json};

use crate::errors::Result;
use crate::expr::Expr;
use crate::json::ToJson;

const ALL_TIME: &str = "allTime";

/// Restricts which historical versions of a row are visible or affected.
#[derive(Debug, Clone, PartialEq)]
pub enum TemporalFilter {
    /// Versions current at a single instant.
    At(Expr),
    /// Open ended, starting at the given instant.
    From(Expr),
    /// Open start, ending at the given instant.
    To(Expr),
    /// Bounded interval.
    In(Expr, Expr),
    AllTime,
}

impl TemporalFilter {
    pub fn at(t: impl Into<Expr>) -> Self {
        Self::At(t.into())
    }

    pub fn starting(from: impl Into<Expr>) -> Self {
        Self::From(from.into())
    }

    pub fn until(to: impl Into<Expr>) -> Self {
        Self::To(to.into())
    }

    pub fn during(from: impl Into<Expr>, to: impl Into<Expr>) -> Self {
        Self::In(from.into(), to.into())
    }

    /// Serialize in the `{"from": .., "to": ..}` form used by update and
    /// delete operations. An absent filter is an empty object.
    pub fn extents_json(filter: Option<&TemporalFilter>) -> Result<JsonValue> {
        Ok(match filter {
            None => json!({}),
            Some(TemporalFilter::From(from)) => json!({"from": from.to_json()?, "to": null}),
            Some(TemporalFilter::To(to)) => json!({"from": null, "to": to.to_json()?}),
            Some(TemporalFilter::In(from, to)) => {
                json!({"from": from.to_json()?, "to": to.to_json()?})
            }
            Some(other) => other.to_json()?,
        })
    }
}

impl ToJson for TemporalFilter {
    fn to_json(&self) -> Result<JsonValue> {
        Ok(match self {
            Self::At(t) => json!({"at": t.to_json()?}),
            Self::From(from) => json!({"from": from.to_json()?}),
            Self::To(to) => json!({"to": to.to_json()?}),
            Self::In(from, to) => json!({"in": [from.to_json()?, to.to_json()?]}),
            Self::AllTime => JsonValue::String(ALL_TIME.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn ts(day: u32) -> Expr {
        Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap().into()
    }

    fn tagged(day: u32) -> JsonValue {
        json!({"@type": "xt:timestamptz", "@value": format!("2020-01-0{day}T00:00:00Z")})
    }

    #[test]
    fn filter_fragments() {
        let (d1, d2) = (tagged(1), tagged(2));

        assert_eq!(
            json!({"from": d1.clone()}),
            TemporalFilter::starting(ts(1)).to_json().unwrap()
        );
        assert_eq!(
            json!({"to": d2.clone()}),
            TemporalFilter::until(ts(2)).to_json().unwrap()
        );
        assert_eq!(
            json!({"in": [d1.clone(), d2]}),
            TemporalFilter::during(ts(1), ts(2)).to_json().unwrap()
        );
        assert_eq!(json!({"at": d1}), TemporalFilter::at(ts(1)).to_json().unwrap());
        assert_eq!(json!("allTime"), TemporalFilter::AllTime.to_json().unwrap());
    }

    #[test]
    fn extents_fragments() {
        assert_eq!(json!({}), TemporalFilter::extents_json(None).unwrap());
        assert_eq!(
            json!({"from": tagged(1), "to": null}),
            TemporalFilter::extents_json(Some(&TemporalFilter::starting(ts(1)))).unwrap()
        );
        assert_eq!(
            json!("allTime"),
            TemporalFilter::extents_json(Some(&TemporalFilter::AllTime)).unwrap()
        );
    }
}
