//! In-process stand-in for an XTDB node.
//!
//! Understands just enough SQL for the tests: `INSERT INTO t (cols) VALUES
//! (...)`, `SELECT * FROM t` and `SELECT 1`. Every insert writes a new
//! version of the row keyed by its first column, stamped with the
//! transaction's id and system time.
#![allow(dead_code)]

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{Map, Value as JsonValue, json};
use xtdb_client::dbapi::Connection;
use xtdb_client::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use xtdb_client::{Result, Xtdb};
use xtql::json::{format_timestamp, parse_timestamp};

static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^INSERT\s+INTO\s+(\w+)\s*\(([^)]*)\)\s*VALUES\s*\((.*)\)$").unwrap()
});

static SELECT_ALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^SELECT\s+\*\s+FROM\s+(\w+)$").unwrap());

#[derive(Debug)]
struct Version {
    tx_id: i64,
    system_time: DateTime<FixedOffset>,
    table: String,
    id: JsonValue,
    doc: Map<String, JsonValue>,
}

#[derive(Debug, Default)]
struct Node {
    next_tx_id: i64,
    versions: Vec<Version>,
    requests: Vec<(Method, String, JsonValue)>,
}

impl Node {
    fn default_system_time(&self) -> DateTime<FixedOffset> {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (epoch + TimeDelta::hours(self.next_tx_id)).fixed_offset()
    }

    fn status(&self) -> JsonValue {
        let latest = self.versions.last().map(|v| {
            json!({
                "txId": v.tx_id,
                "systemTime": {"@type": "xt:timestamptz", "@value": format_timestamp(&v.system_time)},
            })
        });
        json!({"latestCompletedTx": latest})
    }

    fn submit_tx(&mut self, body: &JsonValue) -> Result<JsonValue, String> {
        let system_time = match body.get("systemTime").and_then(JsonValue::as_str) {
            Some(t) => parse_timestamp(t).map_err(|e| e.to_string())?,
            None => self.default_system_time(),
        };

        let ops = body["txOps"].as_array().ok_or("missing txOps")?;
        let mut staged = Vec::with_capacity(ops.len());
        for op in ops {
            let sql = op["sql"].as_str().ok_or("only SQL operations are supported")?;
            staged.push(parse_insert(sql)?);
        }

        let tx_id = self.next_tx_id;
        self.next_tx_id += 1;
        for (table, doc) in staged {
            let id = doc.values().next().cloned().unwrap_or(JsonValue::Null);
            self.versions.push(Version {
                tx_id,
                system_time,
                table,
                id,
                doc,
            });
        }

        Ok(json!({"txId": tx_id, "systemTime": format_timestamp(&system_time)}))
    }

    fn query(&self, body: &JsonValue) -> Result<Vec<JsonValue>, String> {
        let sql = body["query"]["sql"].as_str().ok_or("only SQL queries are supported")?;
        if sql.eq_ignore_ascii_case("SELECT 1") {
            return Ok(vec![json!({"_column_1": 1})]);
        }

        let caps = SELECT_ALL_RE
            .captures(sql.trim())
            .ok_or_else(|| format!("unsupported query: {sql}"))?;
        let table = &caps[1];

        let basis = &body["queryOpts"]["basis"];
        let current_time = match basis["currentTime"].as_str() {
            Some(t) => Some(parse_timestamp(t).map_err(|e| e.to_string())?),
            None => None,
        };
        let at_tx = basis["atTx"]["txId"].as_i64();
        let visible = |v: &Version| {
            current_time.is_none_or(|t| v.system_time <= t) && at_tx.is_none_or(|id| v.tx_id <= id)
        };

        // Latest visible version per id, in order of first insert.
        let mut rows: Vec<(JsonValue, Map<String, JsonValue>)> = Vec::new();
        for version in self.versions.iter().filter(|v| v.table == table && visible(v)) {
            match rows.iter_mut().find(|(id, _)| *id == version.id) {
                Some((_, doc)) => *doc = version.doc.clone(),
                None => rows.push((version.id.clone(), version.doc.clone())),
            }
        }

        Ok(rows.into_iter().map(|(_, doc)| JsonValue::Object(doc)).collect())
    }
}

fn parse_insert(sql: &str) -> Result<(String, Map<String, JsonValue>), String> {
    let caps = INSERT_RE
        .captures(sql.trim())
        .ok_or_else(|| format!("unsupported statement: {sql}"))?;

    let cols = caps[2].split(',').map(str::trim);
    let vals = caps[3].split(',').map(str::trim);

    let mut doc = Map::new();
    for (col, val) in cols.zip(vals) {
        let val = if let Some(s) = val.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            JsonValue::String(s.to_string())
        } else {
            let n: i64 = val.parse().map_err(|_| format!("unsupported literal: {val}"))?;
            JsonValue::from(n)
        };
        doc.insert(col.to_string(), val);
    }

    Ok((caps[1].to_string(), doc))
}

fn server_error(message: &str) -> HttpResponse {
    let body = json!({"@type": "xt:error", "@value": {"xtdb.error/message": message}});
    HttpResponse::new(StatusCode::BAD_REQUEST, body.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    node: Arc<Mutex<Node>>,
}

impl FakeServer {
    /// Path and body of every request received so far.
    pub fn requests(&self) -> Vec<(String, JsonValue)> {
        self.node
            .lock()
            .requests
            .iter()
            .map(|(_, path, body)| (path.clone(), body.clone()))
            .collect()
    }
}

impl HttpTransport for FakeServer {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let body: JsonValue = match &request.body {
            Some(body) => serde_json::from_slice(body)?,
            None => JsonValue::Null,
        };

        let mut node = self.node.lock();
        let path = request.url.path().to_string();
        node.requests.push((request.method, path.clone(), body.clone()));

        let resp = match (request.method, path.as_str()) {
            (Method::Get, "/status") => {
                HttpResponse::new(StatusCode::OK, node.status().to_string())
            }
            (Method::Post, "/tx") => match node.submit_tx(&body) {
                Ok(key) => HttpResponse::new(StatusCode::OK, key.to_string()),
                Err(message) => server_error(&message),
            },
            (Method::Post, "/query") => match node.query(&body) {
                // Rows come back newline delimited.
                Ok(rows) => {
                    let text = rows.iter().map(|r| format!("{r}\n")).collect::<String>();
                    HttpResponse::new(StatusCode::OK, text)
                }
                Err(message) => server_error(&message),
            },
            _ => HttpResponse::new(StatusCode::NOT_FOUND, "not found"),
        };

        Ok(resp)
    }
}

pub fn client(server: &FakeServer) -> Xtdb<FakeServer> {
    logutil::init_test();
    Xtdb::with_transport("http://xtdb.test:3000", server.clone()).unwrap()
}

pub fn connection(server: &FakeServer) -> Connection<FakeServer> {
    Connection::new(client(server))
}

pub fn ts(s: &str) -> DateTime<FixedOffset> {
    parse_timestamp(s).unwrap()
}
