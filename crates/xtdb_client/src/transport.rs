//! HTTP transport used by the client.
//!
//! The client only needs a single blocking request/response exchange, so the
//! transport is a small trait. [`ReqwestTransport`] is the pooled production
//! implementation; tests substitute an in-process server.
use std::fmt::Debug;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::trace;
use url::Url;

use crate::errors::Result;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub trait HttpTransport: Send + Debug {
    /// Do the request, blocking until the full response body is read.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ReqwestTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    pub fn build(self) -> Result<ReqwestTransport> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        default_headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));

        // Blocking clients apply a 30s timeout unless told otherwise.
        let builder = Client::builder()
            .user_agent(APP_USER_AGENT)
            .default_headers(default_headers)
            .timeout(self.timeout);

        let builder = match self.connect_timeout {
            Some(connect_timeout) => builder.connect_timeout(connect_timeout),
            None => builder,
        };

        Ok(ReqwestTransport {
            client: builder.build()?,
        })
    }
}

/// Transport backed by a pooled blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        let builder = match request.body {
            Some(body) => builder.body(body),
            None => builder,
        };

        let resp = builder.send()?;
        let status = resp.status();
        let body = resp.bytes()?;
        trace!(%status, len = body.len(), "response");

        Ok(HttpResponse { status, body })
    }
}
