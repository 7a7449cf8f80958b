//! HTTP seam: request/response types, the transport trait and the timeout
//! wrapper every client goes through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;

// Set by the transport itself.
const RESERVED_HEADERS: [&str; 3] = ["host", "content-length", "transfer-encoding"];

/// An absolute `http`/`https` URL with a host and no embedded credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, HttpError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(invalid_url("", "empty URL"));
        }
        let parsed = Url::parse(&url).map_err(|e| invalid_url(&url, &e.to_string()))?;
        Self::from_url(&parsed)
    }

    pub fn from_url(parsed: &Url) -> Result<Self, HttpError> {
        let raw = parsed.as_str();
        if raw.len() > MAX_URL_LENGTH {
            return Err(invalid_url(raw, &format!("longer than {MAX_URL_LENGTH} bytes")));
        }
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid_url(raw, &format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid_url(raw, "embedded credentials"));
        }
        let Some(host) = parsed.host_str() else {
            return Err(invalid_url(raw, "missing host"));
        };

        Ok(Self {
            url: raw.to_string(),
            host: host.to_ascii_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Log-safe form of the URL: the query string is dropped since it may
    /// carry access tokens.
    pub fn redacted(&self) -> String {
        match self.url.split_once('?') {
            Some((path, _)) => format!("{path}?…"),
            None => self.url.clone(),
        }
    }
}

fn invalid_url(url: &str, reason: &str) -> HttpError {
    let shown: String = url.chars().take(100).collect();
    HttpError::InvalidUrl {
        url: shown,
        reason: reason.to_string(),
    }
}

/// Case-insensitive header list. Inserting a name that is already present
/// replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaders(Vec<(String, String)>);

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HttpError> {
        let (name, value) = (name.into(), value.into());
        let reject = |reason: &str| {
            Err(HttpError::InvalidHeader {
                name: name.clone(),
                reason: reason.to_string(),
            })
        };

        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
            return reject("not a valid header name");
        }
        if RESERVED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(&name)) {
            return reject("set by the transport");
        }
        if value.contains(|c| matches!(c, '\r' | '\n' | '\0')) {
            return reject("control characters in value");
        }

        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.0.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find_map(|(n, v)| n.eq_ignore_ascii_case(name).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    method: HttpMethod,
    url: ValidatedUrl,
    headers: HttpHeaders,
    body: Option<Vec<u8>>,
    timeout_ms: u64,
    request_id: String,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: ValidatedUrl) -> Self {
        Self {
            method,
            url,
            headers: HttpHeaders::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn get(url: &Url) -> Result<Self, HttpError> {
        Ok(Self::new(HttpMethod::Get, ValidatedUrl::from_url(url)?))
    }

    pub fn post(url: &Url) -> Result<Self, HttpError> {
        Ok(Self::new(HttpMethod::Post, ValidatedUrl::from_url(url)?))
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, HttpError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, HttpError> {
        if self.method != HttpMethod::Post {
            return Err(HttpError::InvalidRequest {
                reason: format!("{} requests cannot have a body", self.method.as_str()),
            });
        }

        let body = serde_json::to_vec(value).map_err(|e| HttpError::SerializationError {
            message: e.to_string(),
        })?;
        if body.len() > MAX_REQUEST_BODY_SIZE {
            return Err(HttpError::BodyTooLarge {
                size: body.len(),
                max: MAX_REQUEST_BODY_SIZE,
            });
        }

        self.headers.insert("Content-Type", "application/json")?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, HttpError> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if ms == 0 {
            return Err(HttpError::InvalidRequest {
                reason: "timeout cannot be zero".to_string(),
            });
        }
        if ms > MAX_TIMEOUT_MS {
            return Err(HttpError::InvalidRequest {
                reason: format!("timeout exceeds maximum of {MAX_TIMEOUT_MS}ms"),
            });
        }
        self.timeout_ms = ms;
        Ok(self)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request body too large: {size} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge { size: usize, max: usize },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("serialization error: {message}")]
    SerializationError { message: String },

    #[error("connection failed to {host}: {message}")]
    ConnectionError { host: String, message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },

    #[error("HTTP error {status}: {status_text}")]
    HttpStatus {
        status: u16,
        status_text: String,
        request_id: String,
    },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String, request_id: String },
}

impl HttpError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Timeout { .. } | HttpError::ConnectionError { .. } => true,
            HttpError::HttpStatus { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Timeout { .. })
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            HttpError::Timeout { request_id, .. }
            | HttpError::HttpStatus { request_id, .. }
            | HttpError::InvalidResponse { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    status_text: String,
    body: Vec<u8>,
    request_id: String,
    duration_ms: u64,
}

impl HttpResponse {
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        body: Vec<u8>,
        request_id: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body,
            request_id: request_id.into(),
            duration_ms,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Turns a non-2xx response into [`HttpError::HttpStatus`].
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HttpError::HttpStatus {
            status: self.status,
            status_text: self.status_text,
            request_id: self.request_id,
        })
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::InvalidResponse {
            reason: format!("failed to parse JSON: {e}"),
            request_id: self.request_id.clone(),
        })
    }
}

pub type HttpResult = Result<HttpResponse, HttpError>;

/// Executes requests on behalf of the clients. Implementations must not apply
/// their own deadline; [`send_with_timeout`] owns that.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> HttpResult;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn execute(&self, request: &HttpRequest) -> HttpResult {
        (**self).execute(request).await
    }
}

/// Runs `request` under its timeout. On expiry the in-flight future is
/// dropped, which aborts the underlying request.
pub async fn send_with_timeout<T: HttpTransport + ?Sized>(
    transport: &T,
    request: &HttpRequest,
) -> HttpResult {
    debug!(
        request_id = request.request_id(),
        method = request.method().as_str(),
        url = %request.url().redacted(),
        "sending request"
    );

    match tokio::time::timeout(request.timeout(), transport.execute(request)).await {
        Ok(Ok(response)) => {
            debug!(
                request_id = request.request_id(),
                status = response.status(),
                duration_ms = response.duration_ms(),
                "response received"
            );
            Ok(response)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let timeout_ms = request.timeout_ms;
            warn!(request_id = request.request_id(), timeout_ms, "request timed out");
            Err(HttpError::Timeout {
                timeout_ms,
                request_id: request.request_id().to_string(),
            })
        }
    }
}

#[cfg(feature = "native-http")]
pub use self::native::ReqwestTransport;

#[cfg(feature = "native-http")]
mod native {
    use super::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult, HttpTransport};
    use async_trait::async_trait;
    use std::time::Instant;

    const USER_AGENT: &str = concat!("place-sense/", env!("CARGO_PKG_VERSION"));

    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .map_err(|e| HttpError::InvalidRequest {
                    reason: format!("failed to build HTTP client: {e}"),
                })?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn execute(&self, request: &HttpRequest) -> HttpResult {
            let started = Instant::now();
            let method = match request.method() {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            };

            let mut builder = self.client.request(method, request.url().as_str());
            for (name, value) in request.headers().iter() {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body() {
                builder = builder.body(body.to_vec());
            }

            let response = builder.send().await.map_err(|e| HttpError::ConnectionError {
                host: request.url().host().to_string(),
                message: e.to_string(),
            })?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| HttpError::InvalidResponse {
                    reason: format!("failed to read body: {e}"),
                    request_id: request.request_id().to_string(),
                })?
                .to_vec();

            Ok(HttpResponse::new(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                body,
                request.request_id(),
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ))
        }
    }
}
