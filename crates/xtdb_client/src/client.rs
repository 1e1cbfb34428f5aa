//! Sessioned client.
//!
//! Every RPC is exactly one blocking round trip through the transport. The
//! client remembers the latest transaction it submitted and carries a basis
//! pin and an import system time that are applied to later requests.
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use url::Url;
use xtql::json::{decode_documents, decode_str, format_timestamp, parse_timestamp};
use xtql::{ErrorMode, Query, Row, ToJson, TxOp, Value};

use crate::config::ClientConfig;
use crate::errors::{Result, XtdbError};
use crate::opts::{AtTx, Basis, QueryOptions, TxOptions};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Identifies a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxKey {
    pub tx_id: i64,
    pub system_time: DateTime<FixedOffset>,
}

impl TxKey {
    pub fn new(tx_id: i64, system_time: DateTime<FixedOffset>) -> Self {
        TxKey { tx_id, system_time }
    }

    fn from_response(value: Value) -> Result<Self> {
        let malformed = || XtdbError::MalformedResponse("expected txId and systemTime".to_string());
        let map = value.as_map().ok_or_else(malformed)?;

        let tx_id = map.get("txId").and_then(Value::as_i64).ok_or_else(malformed)?;
        let system_time = match map.get("systemTime") {
            Some(Value::Timestamp(t)) => *t,
            Some(Value::String(s)) => parse_timestamp(s)?,
            _ => return Err(malformed()),
        };

        Ok(TxKey { tx_id, system_time })
    }
}

impl fmt::Display for TxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TxKey '{}' '{}'>",
            self.tx_id,
            format_timestamp(&self.system_time)
        )
    }
}

/// What queries are pinned to. Only one pin is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BasisPin {
    CurrentTime(DateTime<FixedOffset>),
    AtTx(TxKey),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SessionState {
    latest_submitted_tx: Option<TxKey>,
    pin: Option<BasisPin>,
    import_system_time: Option<DateTime<FixedOffset>>,
}

impl SessionState {
    /// Keep whichever key has the highest id.
    fn observe_tx(&mut self, key: &TxKey) {
        match &self.latest_submitted_tx {
            Some(latest) if latest.tx_id >= key.tx_id => (),
            _ => self.latest_submitted_tx = Some(key.clone()),
        }
    }
}

#[derive(Debug)]
pub struct Xtdb<T = ReqwestTransport> {
    url: Url,
    transport: T,
    error_mode: ErrorMode,
    default_tz: Option<String>,
    state: SessionState,
}

impl Xtdb<ReqwestTransport> {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_transport(url, ReqwestTransport::builder().build()?)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = ReqwestTransport::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(connect_timeout);
        }

        let mut client = Self::with_transport(&config.url, builder.build()?)?
            .with_error_mode(config.error_mode());
        client.default_tz = config.default_tz.clone();
        Ok(client)
    }
}

impl<T: HttpTransport> Xtdb<T> {
    pub fn with_transport(url: &str, transport: T) -> Result<Self> {
        Ok(Xtdb {
            url: Url::parse(url)?,
            transport,
            error_mode: ErrorMode::default(),
            default_tz: None,
            state: SessionState::default(),
        })
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn latest_submitted_tx(&self) -> Option<&TxKey> {
        self.state.latest_submitted_tx.as_ref()
    }

    pub fn basis(&self) -> Option<&DateTime<FixedOffset>> {
        match &self.state.pin {
            Some(BasisPin::CurrentTime(t)) => Some(t),
            _ => None,
        }
    }

    pub fn at_tx(&self) -> Option<&TxKey> {
        match &self.state.pin {
            Some(BasisPin::AtTx(key)) => Some(key),
            _ => None,
        }
    }

    pub fn import_system_time(&self) -> Option<&DateTime<FixedOffset>> {
        self.state.import_system_time.as_ref()
    }

    /// Pin queries to wall-clock time `t`. Replaces any at-tx pin.
    pub fn set_basis(&mut self, t: DateTime<FixedOffset>) {
        debug!(basis = %t, "set basis");
        self.state.pin = Some(BasisPin::CurrentTime(t));
    }

    /// Like [`Xtdb::set_basis`], parsing `t` first.
    pub fn set_basis_str(&mut self, t: &str) -> Result<()> {
        let t = parse_session_timestamp(t)?;
        self.set_basis(t);
        Ok(())
    }

    pub fn clear_basis(&mut self) {
        if matches!(self.state.pin, Some(BasisPin::CurrentTime(_))) {
            debug!("clear basis");
            self.state.pin = None;
        }
    }

    /// Pin queries to the state visible at `key`. Replaces any basis pin.
    pub fn set_at_tx(&mut self, key: TxKey) {
        debug!(tx_id = key.tx_id, "set at_tx");
        self.state.pin = Some(BasisPin::AtTx(key));
    }

    pub fn clear_at_tx(&mut self) {
        if matches!(self.state.pin, Some(BasisPin::AtTx(_))) {
            debug!("clear at_tx");
            self.state.pin = None;
        }
    }

    /// Record `t` as the system time of subsequent transactions, until
    /// cleared.
    pub fn set_import_system_time(&mut self, t: DateTime<FixedOffset>) {
        debug!(import_system_time = %t, "set import system time");
        self.state.import_system_time = Some(t);
    }

    pub fn set_import_system_time_str(&mut self, t: &str) -> Result<()> {
        let t = parse_session_timestamp(t)?;
        self.set_import_system_time(t);
        Ok(())
    }

    pub fn clear_import_system_time(&mut self) {
        debug!("clear import system time");
        self.state.import_system_time = None;
    }

    pub fn status(&self) -> Result<Value> {
        self.try_status().map_err(XtdbError::in_request("status"))
    }

    fn try_status(&self) -> Result<Value> {
        let resp = self.send(Method::Get, "status", None)?;
        let resp = check_status(resp, "getting status")?;
        Ok(decode_str(&resp.text(), self.error_mode)?)
    }

    /// Submit `ops` as one transaction.
    ///
    /// A pending import system time overrides `opts.system_time`. The latest
    /// submitted transaction only moves forward, and only on success.
    pub fn submit_tx(&mut self, ops: &[TxOp], opts: TxOptions) -> Result<TxKey> {
        let key = self.try_submit_tx(ops, opts).map_err(XtdbError::in_request("submitTx"))?;
        self.state.observe_tx(&key);
        Ok(key)
    }

    fn try_submit_tx(&self, ops: &[TxOp], mut opts: TxOptions) -> Result<TxKey> {
        if let Some(t) = self.state.import_system_time {
            opts.system_time = Some(t);
        }
        if opts.default_tz.is_none() {
            opts.default_tz = self.default_tz.clone();
        }

        let mut body = Map::new();
        body.insert("txOps".to_string(), ops.to_json()?);
        if let JsonValue::Object(opts) = serde_json::to_value(&opts)? {
            body.extend(opts);
        }

        debug!(ops = ops.len(), "submitting tx");
        let resp = self.send(Method::Post, "tx", Some(JsonValue::Object(body)))?;
        let resp = check_status(resp, "submitting tx")?;
        let key = TxKey::from_response(decode_str(&resp.text(), self.error_mode)?)?;
        debug!(tx_id = key.tx_id, system_time = %key.system_time, "tx submitted");

        Ok(key)
    }

    /// Run `query`, returning the decoded rows.
    ///
    /// An active basis or at-tx pin replaces `opts.basis`.
    pub fn query(&self, query: &Query, opts: QueryOptions) -> Result<Vec<Row>> {
        self.try_query(query, opts).map_err(XtdbError::in_request("query"))
    }

    fn try_query(&self, query: &Query, mut opts: QueryOptions) -> Result<Vec<Row>> {
        match &self.state.pin {
            Some(BasisPin::CurrentTime(t)) => {
                opts.basis = Some(Basis {
                    current_time: Some(*t),
                    at_tx: None,
                })
            }
            Some(BasisPin::AtTx(key)) => {
                opts.basis = Some(Basis {
                    current_time: None,
                    at_tx: Some(AtTx::from(key)),
                })
            }
            None => (),
        }
        if opts.default_tz.is_none() {
            opts.default_tz = self.default_tz.clone();
        }

        let mut body = Map::new();
        body.insert("query".to_string(), query.to_json()?);
        body.insert("queryOpts".to_string(), serde_json::to_value(&opts)?);

        let resp = self.send(Method::Post, "query", Some(JsonValue::Object(body)))?;
        let resp = check_status(resp, "submitting query")?;

        let rows = decode_documents(&resp.text(), self.error_mode)?
            .into_iter()
            .map(|row| match row {
                Value::Map(row) => Ok(row),
                other => Err(XtdbError::MalformedResponse(format!(
                    "expected result row to be a map, got {}",
                    other.kind()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(rows = rows.len(), "query complete");

        Ok(rows)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    fn send(&self, method: Method, path: &str, body: Option<JsonValue>) -> Result<HttpResponse> {
        let url = self.endpoint(path)?;
        let body = body
            .map(|body| serde_json::to_vec(&body))
            .transpose()?
            .map(Into::into);
        debug!(?method, %url, "sending request");
        self.transport.send(HttpRequest { method, url, body })
    }
}

impl<T> fmt::Display for Xtdb<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Xtdb '{}'>", self.url.as_str().trim_end_matches('/'))
    }
}

fn check_status(resp: HttpResponse, action: &'static str) -> Result<HttpResponse> {
    if resp.status.is_success() {
        return Ok(resp);
    }
    Err(XtdbError::Http {
        action,
        status: resp.status.as_u16(),
        reason: resp.reason().to_string(),
        body: resp.text(),
    })
}

fn parse_session_timestamp(t: &str) -> Result<DateTime<FixedOffset>> {
    parse_timestamp(t).map_err(|_| XtdbError::InvalidTimestamp(t.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use xtql::query::SqlQuery;
    use xtql::tx::Sql;

    use super::*;
    use crate::testutil::MockTransport;

    fn ts(day: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap().fixed_offset()
    }

    fn client(mock: &MockTransport) -> Xtdb<MockTransport> {
        Xtdb::with_transport("http://localhost:3000/", mock.clone()).unwrap()
    }

    fn sql_query(sql: &str) -> Query {
        Query::from(SqlQuery::new(sql))
    }

    #[test]
    fn latest_tx_is_monotonic() {
        let mock = MockTransport::default();
        mock.respond_ok(json!({"txId": 5, "systemTime": "2020-01-05T00:00:00Z"}));
        mock.respond_ok(json!({"txId": 3, "systemTime": "2020-01-03T00:00:00Z"}));
        mock.respond_ok(json!({"txId": 7, "systemTime": {"@type": "xt:timestamptz", "@value": "2020-01-07T00:00:00Z"}}));

        let mut xt = client(&mock);
        let ops = [TxOp::from(Sql::new("INSERT INTO t (xt$id) VALUES (1)"))];

        let mut seen = Vec::new();
        for _ in 0..3 {
            xt.submit_tx(&ops, TxOptions::default()).unwrap();
            seen.push(xt.latest_submitted_tx().unwrap().tx_id);
        }

        assert_eq!(vec![5, 5, 7], seen);
        assert_eq!(ts(7), xt.latest_submitted_tx().unwrap().system_time);
    }

    #[test]
    fn failed_tx_keeps_tracker() {
        let mock = MockTransport::default();
        mock.respond_ok(json!({"txId": 1, "systemTime": "2020-01-01T00:00:00Z"}));
        mock.respond(400, json!({"@type": "xt:error", "@value": {"xtdb.error/message": "bad"}}));

        let mut xt = client(&mock);
        let ops = [TxOp::from(Sql::new("INSERT INTO t (xt$id) VALUES (1)"))];
        xt.submit_tx(&ops, TxOptions::default()).unwrap();

        let err = xt.submit_tx(&ops, TxOptions::default()).unwrap_err();
        match err {
            XtdbError::Http { status, action, .. } => {
                assert_eq!(400, status);
                assert_eq!("submitting tx", action);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(1, xt.latest_submitted_tx().unwrap().tx_id);
    }

    #[test]
    fn basis_and_at_tx_are_exclusive() {
        let mut xt = client(&MockTransport::default());

        xt.set_basis(ts(1));
        xt.set_at_tx(TxKey::new(4, ts(2)));
        assert_eq!(None, xt.basis());
        assert_eq!(Some(&TxKey::new(4, ts(2))), xt.at_tx());

        xt.set_basis(ts(3));
        assert_eq!(Some(&ts(3)), xt.basis());
        assert_eq!(None, xt.at_tx());

        // Clearing the other kind of pin leaves this one alone.
        xt.clear_at_tx();
        assert_eq!(Some(&ts(3)), xt.basis());
        xt.clear_basis();
        assert_eq!(None, xt.basis());
    }

    #[test]
    fn timestamp_setters_validate() {
        let mut xt = client(&MockTransport::default());

        let err = xt.set_basis_str("yesterday").unwrap_err();
        assert!(matches!(err, XtdbError::InvalidTimestamp(_)), "{err}");
        assert_eq!(None, xt.basis());

        xt.set_import_system_time_str("2020-01-02T00:00:00Z").unwrap();
        assert_eq!(Some(&ts(2)), xt.import_system_time());
    }

    #[test]
    fn query_injects_pins() {
        let mock = MockTransport::default();
        mock.respond_ok(json!([]));
        mock.respond_ok(json!([]));

        let mut xt = client(&mock);
        xt.set_basis(ts(1));
        xt.query(&sql_query("SELECT 1"), QueryOptions::default()).unwrap();
        xt.set_at_tx(TxKey::new(2, ts(2)));
        xt.query(&sql_query("SELECT 1"), QueryOptions::default()).unwrap();

        let reqs = mock.requests();
        assert_eq!("http://localhost:3000/query", reqs[0].url.as_str());
        assert_eq!(
            json!({"currentTime": "2020-01-01T00:00:00Z"}),
            reqs[0].json()["queryOpts"]["basis"]
        );
        assert_eq!(
            json!({"atTx": {"txId": 2, "systemTime": "2020-01-02T00:00:00Z"}}),
            reqs[1].json()["queryOpts"]["basis"]
        );
        assert_eq!(json!({"sql": "SELECT 1"}), reqs[1].json()["query"]);
    }

    #[test]
    fn tx_injects_import_system_time() {
        let mock = MockTransport::default();
        mock.respond_ok(json!({"txId": 0, "systemTime": "2020-01-02T00:00:00Z"}));

        let mut xt = client(&mock);
        xt.set_import_system_time(ts(2));
        let key = xt
            .submit_tx(
                &[TxOp::from(Sql::new("INSERT INTO t (xt$id) VALUES (1)"))],
                TxOptions::default(),
            )
            .unwrap();
        assert_eq!(TxKey::new(0, ts(2)), key);

        let body = mock.requests()[0].json();
        assert_eq!(json!("2020-01-02T00:00:00Z"), body["systemTime"]);
        assert_eq!(json!([{"sql": "INSERT INTO t (xt$id) VALUES (1)"}]), body["txOps"]);
    }

    #[test]
    fn query_decodes_rows() {
        let mock = MockTransport::default();
        mock.respond_text(
            200,
            "{\"xt$id\": {\"@type\": \"xt:uuid\", \"@value\": \"97a392d5-5e3f-406f-9651-a828ee79b156\"}}\n{\"xt$id\": 2}\n",
        );

        let xt = client(&mock);
        let rows = xt.query(&sql_query("SELECT * FROM t"), QueryOptions::default()).unwrap();
        assert_eq!(2, rows.len());
        assert_eq!(xtql::value::ValueKind::Uuid, rows[0]["xt$id"].kind());
        assert_eq!(Value::Int(2), rows[1]["xt$id"]);
    }

    #[test]
    fn embedded_server_error_fails_query() {
        let mock = MockTransport::default();
        mock.respond_ok(json!([{"@type": "xt:error", "@value": {"xtdb.error/message": "division by zero"}}]));

        let xt = client(&mock);
        let err = xt.query(&sql_query("SELECT 1/0"), QueryOptions::default()).unwrap_err();
        assert!(matches!(err, XtdbError::Request { request: "query", .. }), "{err}");
        assert_eq!("Error in query request: division by zero", err.to_string());
    }

    #[test]
    fn status_failure_surfaces_body() {
        let mock = MockTransport::default();
        mock.respond_text(503, "starting up");

        let err = client(&mock).status().unwrap_err();
        assert_eq!(
            "Error getting status: 503 (Service Unavailable): starting up",
            err.to_string()
        );
    }

    #[test]
    fn display_forms() {
        let xt = client(&MockTransport::default());
        assert_eq!("<Xtdb 'http://localhost:3000'>", xt.to_string());
        assert_eq!(
            "<TxKey '3' '2020-01-01T00:00:00Z'>",
            TxKey::new(3, ts(1)).to_string()
        );
    }
}
