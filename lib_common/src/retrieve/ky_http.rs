//! # HTTP Retrieval Utilities
//!
//! This module provides a uniform asynchronous HTTP client wrapper around `reqwest`.
//! Every call resolves to a [`RequestResult`], whether the server answered with a
//! success, answered with an error status, or could not be reached at all, so callers
//! never have to handle a transport error separately from a bad response.
//!
//! Retries are not performed here; see [`crate::retrieve::retry`].

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

/// Timeout applied to a call when the caller does not supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while constructing an [`ApiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying `reqwest` client (TLS backend, connection pool) could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Outcome of one HTTP attempt.
///
/// Exactly one of `ok == true` and `error.is_some()` holds. A failed attempt that
/// still received a response keeps its status, headers and body for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct RequestResult {
    /// `true` when the server answered with a 2xx status.
    pub ok: bool,
    /// The numeric HTTP status code, if a response was received.
    pub status_code: Option<u16>,
    /// Response headers. Lookups are case-insensitive.
    pub headers: HeaderMap,
    /// The decoded response body; empty when no response was received.
    pub body_text: String,
    /// The parsed body, present only when `body_text` is valid JSON.
    pub body_json: Option<Value>,
    /// Description of the failure; present iff `ok` is false.
    pub error: Option<String>,
}

impl RequestResult {
    /// Builds a failed result that carries no response.
    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown transport error".to_string();
        }
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Builds a result from a received response, successful or not.
    pub fn from_response(status: StatusCode, headers: HeaderMap, body: &[u8]) -> Self {
        let body_text = decode_body(body);
        let body_json = serde_json::from_str::<Value>(&body_text).ok();
        let ok = status.is_success();
        Self {
            ok,
            status_code: Some(status.as_u16()),
            headers,
            body_text,
            body_json,
            error: (!ok).then(|| format!("HTTP status {status}")),
        }
    }

    /// The error description, or an empty string for a successful result.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

/// A request body.
///
/// `Json` bodies are serialized and tagged `application/json`; `Text` and `Bytes`
/// are sent verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A mapping or sequence to be serialized as JSON.
    Json(Value),
    /// A string sent as-is.
    Text(String),
    /// Raw bytes sent as-is.
    Bytes(Vec<u8>),
}

impl Payload {
    /// Stringifies any displayable value into a verbatim text body.
    pub fn display(value: impl fmt::Display) -> Self {
        Payload::Text(value.to_string())
    }

    fn into_parts(self) -> (Vec<u8>, bool) {
        match self {
            Payload::Json(value) => (value.to_string().into_bytes(), true),
            Payload::Text(text) => (text.into_bytes(), false),
            Payload::Bytes(bytes) => (bytes, false),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Payload::Json(value),
            Value::String(text) => Payload::Text(text),
            other => Payload::Text(other.to_string()),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// A shareable asynchronous HTTP client.
///
/// Holds two connection pools, one validating certificates and one accepting
/// invalid or self-signed ones, so TLS verification can be chosen per call.
/// Configuration is read-only after construction.
#[derive(Debug, Clone)]
pub struct ApiClient {
    verified: Client,
    unverified: Client,
    verify: bool,
    default_headers: HeaderMap,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `verify` - Default TLS verification flag for calls that do not override it.
    /// * `default_headers` - Headers added to every request unless the caller overrides them.
    ///
    /// # Errors
    /// Returns [`ClientError::Build`] if the TLS backend cannot be initialized.
    pub fn new(verify: bool, default_headers: Option<HeaderMap>) -> Result<Self, ClientError> {
        let verified = Client::builder().build()?;
        let unverified = Client::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;

        Ok(Self {
            verified,
            unverified,
            verify,
            default_headers: default_headers.unwrap_or_default(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Replaces the timeout used when a call does not specify one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The timeout used when a call does not specify one.
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs a GET request, url-encoding `params` into the query string.
    pub async fn get(
        &self,
        url: &str,
        params: Option<&[(&str, &str)]>,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
        verify: Option<bool>,
    ) -> RequestResult {
        let mut target = match Url::parse(url) {
            Ok(target) => target,
            Err(e) => return RequestResult::failure(format!("invalid URL {url}: {e}")),
        };
        if let Some(pairs) = params.filter(|pairs| !pairs.is_empty()) {
            target.query_pairs_mut().extend_pairs(pairs.iter());
        }
        self.send(Method::GET, target, None, headers, timeout, verify).await
    }

    /// Performs a POST request.
    pub async fn post(
        &self,
        url: &str,
        payload: Option<Payload>,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
        verify: Option<bool>,
    ) -> RequestResult {
        self.request(Method::POST, url, payload, headers, timeout, verify).await
    }

    /// Performs a PUT request.
    pub async fn put(
        &self,
        url: &str,
        payload: Option<Payload>,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
        verify: Option<bool>,
    ) -> RequestResult {
        self.request(Method::PUT, url, payload, headers, timeout, verify).await
    }

    /// Performs a PATCH request.
    pub async fn patch(
        &self,
        url: &str,
        payload: Option<Payload>,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
        verify: Option<bool>,
    ) -> RequestResult {
        self.request(Method::PATCH, url, payload, headers, timeout, verify).await
    }

    /// Performs a generic HTTP request and converts every outcome into a [`RequestResult`].
    ///
    /// ## Logic:
    /// 1. Default headers are merged with `headers`; per-call values win.
    /// 2. A JSON payload gets `Content-Type: application/json` unless one was supplied.
    /// 3. `verify` (or the client default) picks the validating or non-validating pool.
    /// 4. `timeout` (or the client default) bounds the whole call, body included.
    ///
    /// Network failures, timeouts and malformed URLs are reported through
    /// `RequestResult::error`; this method never panics or returns early with an error.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        payload: Option<Payload>,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
        verify: Option<bool>,
    ) -> RequestResult {
        match Url::parse(url) {
            Ok(target) => self.send(method, target, payload, headers, timeout, verify).await,
            Err(e) => RequestResult::failure(format!("invalid URL {url}: {e}")),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        payload: Option<Payload>,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
        verify: Option<bool>,
    ) -> RequestResult {
        let timeout = timeout.unwrap_or(self.timeout);
        let verify = verify.unwrap_or(self.verify);
        let client = if verify {
            &self.verified
        } else {
            log::debug!("TLS verification disabled for {url}");
            &self.unverified
        };

        let mut merged = self.default_headers.clone();
        if let Some(extra) = headers {
            for (name, value) in extra {
                merged.insert(name.clone(), value.clone());
            }
        }

        let mut body = None;
        if let Some(payload) = payload {
            let (bytes, is_json) = payload.into_parts();
            if is_json && !merged.contains_key(CONTENT_TYPE) {
                merged.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            body = Some(bytes);
        }

        log::debug!("{method} {url} (timeout {timeout:?})");
        let mut req = client.request(method, url.clone()).headers(merged).timeout(timeout);
        if let Some(bytes) = body {
            req = req.body(bytes);
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => return RequestResult::failure(describe_error(&e, timeout)),
        };

        let status = response.status();
        let resp_headers = response.headers().clone();
        match response.bytes().await {
            Ok(bytes) => RequestResult::from_response(status, resp_headers, &bytes),
            Err(e) => RequestResult {
                status_code: Some(status.as_u16()),
                headers: resp_headers,
                error: Some(describe_error(&e, timeout)),
                ..Default::default()
            },
        }
    }
}

/// Builds a `HeaderMap` from name/value pairs, skipping pairs that are not valid headers.
pub fn header_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> HeaderMap
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_ref().as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(h_name), Ok(h_value)) => {
                headers.insert(h_name, h_value);
            }
            _ => log::warn!("Skipping invalid header {:?}", name.as_ref()),
        }
    }
    headers
}

fn describe_error(err: &reqwest::Error, timeout: Duration) -> String {
    let mut text = if err.is_timeout() {
        format!("request timed out after {timeout:?}: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    };
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn decode_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}
