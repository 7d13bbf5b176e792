//! Typed request/response context flowing through the pipeline.
//!
//! Per-request flags are fixed booleans set once at construction; the only
//! mutable bit is `retried`, which flips false→true at most once inside
//! the postprocessor.

use reqwest::Method;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Per-request metadata. Created when a request is issued, discarded after
/// the response or final rejection.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Logical request id, for log correlation across the retry cycle.
    pub request_id: Uuid,
    /// Whether the target is part of the authentication API itself
    /// (login/register/refresh). Auth endpoints are exempt from renewal.
    pub is_auth_endpoint: bool,
    /// Suppress the error toast for this request.
    pub skip_error_toast: bool,
    /// Whether device metadata is merged into the body.
    pub attach_device_metadata: bool,
    retried: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            is_auth_endpoint: false,
            skip_error_toast: false,
            attach_device_metadata: true,
            retried: false,
        }
    }

    /// Context for a login/register/refresh call.
    pub fn auth_endpoint() -> Self {
        Self {
            is_auth_endpoint: true,
            ..Self::new()
        }
    }

    /// Whether this logical request has already been retried after a 401.
    pub fn retried(&self) -> bool {
        self.retried
    }

    /// Record that the single permitted retry has been spent.
    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A part of a multipart body. Owned so the postprocessor can rebuild the
/// form for the retry send.
#[derive(Debug, Clone)]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    Bytes {
        name: String,
        file_name: String,
        data: Vec<u8>,
    },
}

/// Request body.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartPart>),
}

/// An outgoing request, before and after preprocessing.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub context: RequestContext,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body,
            context: RequestContext::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, RequestBody::Empty)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path, RequestBody::Json(body))
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path, RequestBody::Json(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, RequestBody::Empty)
    }

    pub fn multipart(path: impl Into<String>, parts: Vec<MultipartPart>) -> Self {
        Self::new(Method::POST, path, RequestBody::Multipart(parts))
    }

    /// Mark this request as targeting the authentication API.
    pub fn auth_endpoint(mut self) -> Self {
        self.context.is_auth_endpoint = true;
        self
    }

    /// Suppress the error toast on failure.
    pub fn skip_error_toast(mut self) -> Self {
        self.context.skip_error_toast = true;
        self
    }

    /// Opt out of device metadata merging.
    pub fn without_device_metadata(mut self) -> Self {
        self.context.attach_device_metadata = false;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }

    /// Set a header, replacing any existing value (case-insensitive name).
    pub(crate) fn set_header(&mut self, name: &str, value: String) {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }

    /// Attach (or replace) the bearer token.
    pub(crate) fn set_bearer(&mut self, token: &str) {
        self.set_header("Authorization", format!("Bearer {token}"));
    }
}

/// A response that reached us, whatever the status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Backend-provided error message, if any.
    pub(crate) fn error_message(&self) -> Option<String> {
        self.body
            .get("message")
            .or_else(|| self.body.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
