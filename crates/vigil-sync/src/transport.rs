//! HTTP transport to the appliance backend.
//!
//! [`Transport::send`] moves bytes; [`Transport::request`] additionally
//! folds non-2xx statuses into [`TransportError::Http`], so every caller
//! sees the same error shape. Request timeouts belong to the transport
//! (the reqwest client timeout), not to the pollers above it.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Port the backend listens on when the base URL is derived from a host.
pub const DEFAULT_BACKEND_PORT: u16 = 8000;
pub const LOOPBACK_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not reach backend: {0}")]
    Network(String),
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// 2xx response carrying an `{"error": ...}` envelope.
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("could not build request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// True when the backend could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(MultipartBody),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

#[derive(Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for FilePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl MultipartBody {
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    fn into_form(self) -> Result<reqwest::multipart::Form, TransportError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let part = reqwest::multipart::Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.content_type)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            form = form.part(file.field, part);
        }
        Ok(form)
    }
}

/// Raw response: status plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Http {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }

    /// Parse the body as JSON. An empty body is `null`.
    pub fn json(&self) -> Result<Value, TransportError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request against `path` (relative to the base URL).
    ///
    /// Only failures to get a response at all are errors here.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Response, TransportError>;

    /// Like [`send`](Self::send), with non-2xx statuses turned into errors.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Response, TransportError> {
        self.send(method, path, body).await?.error_for_status()
    }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = match body {
            None => builder,
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Multipart(multipart)) => builder.multipart(multipart.into_form()?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("{} {url}: {e}", method.as_str())))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(format!("{} {url}: {e}", method.as_str())))?;

        tracing::debug!(method = method.as_str(), %url, status, len = body.len(), "response");
        Ok(Response {
            status,
            body: body.to_vec(),
        })
    }
}

/// Resolve the backend base URL once at startup.
///
/// An explicit override wins; otherwise the backend is assumed to run on
/// port 8000 of the host the client was served from; otherwise loopback.
/// Trailing slashes are stripped.
pub fn resolve_base_url(explicit: Option<&str>, page_host: Option<&str>) -> String {
    let explicit = explicit.map(str::trim).filter(|s| !s.is_empty());
    let page_host = page_host.map(str::trim).filter(|s| !s.is_empty());
    let chosen = match (explicit, page_host) {
        (Some(url), _) => url.to_string(),
        (None, Some(host)) => format!("http://{host}:{DEFAULT_BACKEND_PORT}"),
        (None, None) => LOOPBACK_BASE_URL.to_string(),
    };
    chosen.trim_end_matches('/').to_string()
}
