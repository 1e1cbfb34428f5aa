//! Canned-response transport for unit tests.
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use url::Url;

use crate::errors::{Result, XtdbError};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<JsonValue>,
}

impl RecordedRequest {
    pub fn json(&self) -> JsonValue {
        self.body.clone().unwrap_or(JsonValue::Null)
    }
}

#[derive(Debug, Default)]
struct Inner {
    responses: VecDeque<HttpResponse>,
    requests: Vec<RecordedRequest>,
}

/// Replays queued responses in order and records every request.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn respond_text(&self, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.inner
            .lock()
            .responses
            .push_back(HttpResponse::new(status, body.to_string()));
    }

    pub fn respond(&self, status: u16, body: JsonValue) {
        self.respond_text(status, &body.to_string());
    }

    pub fn respond_ok(&self, body: JsonValue) {
        self.respond(200, body);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().requests.clone()
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut inner = self.inner.lock();
        let body = request
            .body
            .as_ref()
            .map(|b| serde_json::from_slice(b))
            .transpose()?;
        inner.requests.push(RecordedRequest {
            method: request.method,
            url: request.url,
            body,
        });
        inner
            .responses
            .pop_front()
            .ok_or_else(|| XtdbError::MalformedResponse("no response queued".to_string()))
    }
}
