//! Options sent alongside queries and transactions.
use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use xtql::Row;
use xtql::json::format_timestamp;

use crate::client::TxKey;

fn serialize_instant<S>(t: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(t))
}

fn serialize_opt_instant<S>(
    t: &Option<DateTime<FixedOffset>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match t {
        Some(t) => serialize_instant(t, serializer),
        None => serializer.serialize_none(),
    }
}

/// Reference to a transaction, as sent in `atTx` and `afterTx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtTx {
    pub tx_id: i64,
    #[serde(serialize_with = "serialize_instant")]
    pub system_time: DateTime<FixedOffset>,
}

impl From<&TxKey> for AtTx {
    fn from(key: &TxKey) -> Self {
        AtTx {
            tx_id: key.tx_id,
            system_time: key.system_time,
        }
    }
}

/// Point in time a query is evaluated at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Basis {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_instant"
    )]
    pub current_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_tx: Option<AtTx>,
}

impl Basis {
    pub fn is_empty(&self) -> bool {
        self.current_time.is_none() && self.at_tx.is_none()
    }
}

/// How result keys are cased by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyFn {
    CamelCaseString,
    SnakeCaseString,
    KebabCaseString,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Named query parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basis: Option<Basis>,
    /// Wait for this transaction to be indexed before running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_tx: Option<AtTx>,
    /// ISO-8601 duration, e.g. `PT5S`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_fn: Option<KeyFn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOptions {
    /// Overrides the system time recorded for the transaction.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_instant"
    )]
    pub system_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tz: Option<String>,
}
