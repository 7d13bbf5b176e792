//! Transport seam — issues the physical HTTP call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::TransportError;
use crate::pipeline::context::{ApiRequest, ApiResponse, MultipartPart, RequestBody};

/// Sends a prepared request and returns whatever response came back,
/// whatever its status. Errors mean no response was reached.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed transport. Each call carries its own timeout so the
/// original request, a refresh, and a retry never share a clock.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        }
    }

    fn build_headers(request: &ApiRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header value: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn build_form(parts: &[MultipartPart]) -> Form {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
                MultipartPart::Bytes {
                    name,
                    file_name,
                    data,
                } => form.part(
                    name.clone(),
                    Part::bytes(data.clone()).file_name(file_name.clone()),
                ),
            };
        }
        form
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .timeout(self.timeout)
            .headers(Self::build_headers(request)?);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            // The multipart builder sets its own Content-Type with the
            // form boundary; the preprocessor already stripped any override.
            RequestBody::Multipart(parts) => builder.multipart(Self::build_form(parts)),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok(ApiResponse { status, body })
    }
}
