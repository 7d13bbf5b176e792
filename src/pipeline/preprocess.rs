//! Request preprocessor — shapes the outgoing request and attaches the
//! bearer token. No side effects beyond the returned request.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use tracing::debug;

use crate::config::DeviceInfo;
use crate::pipeline::context::{ApiRequest, RequestBody};
use crate::session::coordinator::RefreshCoordinator;

/// Build the request that actually goes on the wire: timestamp header,
/// device metadata, multipart header hygiene, then a fresh token.
pub(crate) async fn prepare(
    mut request: ApiRequest,
    coordinator: &Arc<RefreshCoordinator>,
    device: &DeviceInfo,
) -> ApiRequest {
    shape_request(&mut request, device, Utc::now().timestamp_millis());

    if let Some(token) = coordinator.ensure_fresh_token(&request.context).await {
        request.set_bearer(&token);
    } else {
        debug!(
            request_id = %request.context.request_id,
            "No token available; sending unauthenticated"
        );
    }

    request
}

/// Everything in the preprocessor that doesn't need the coordinator.
pub(crate) fn shape_request(request: &mut ApiRequest, device: &DeviceInfo, now_ms: i64) {
    request.set_header("X-Request-Time", now_ms.to_string());

    if request.is_multipart() {
        // The transport sets its own Content-Type with the form boundary;
        // any caller override would corrupt it.
        strip_content_type(&mut request.headers);
        return;
    }

    if request.method != Method::GET && request.context.attach_device_metadata {
        if let RequestBody::Json(body) = &mut request.body {
            merge_device_metadata(body, device);
        }
    }
}

/// Merge device metadata into a JSON object body. Caller-provided fields
/// win; only absent keys are filled in.
fn merge_device_metadata(body: &mut serde_json::Value, device: &DeviceInfo) {
    let Some(object) = body.as_object_mut() else {
        return;
    };
    let metadata = [
        ("platform", serde_json::json!(device.platform)),
        ("platform_version", serde_json::json!(device.platform_version)),
        ("viewport_width", serde_json::json!(device.viewport_width)),
        ("viewport_height", serde_json::json!(device.viewport_height)),
    ];
    for (key, value) in metadata {
        object.entry(key).or_insert(value);
    }
}

fn strip_content_type(headers: &mut Vec<(String, String)>) {
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
}
