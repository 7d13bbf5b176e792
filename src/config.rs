//! Configuration types.

use std::time::Duration;

use serde::Serialize;

/// Default token time-to-live when the server omits `expires_in`.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(900);

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the backend API.
    pub base_url: String,
    /// Window before expiry during which a proactive renewal is triggered.
    pub refresh_buffer: Duration,
    /// Timeout applied to every physical network call independently
    /// (original request, refresh, retry).
    pub request_timeout: Duration,
    /// Token TTL used when the refresh response omits `expires_in`.
    pub default_token_ttl: Duration,
    /// Whether non-GET JSON requests carry device metadata by default.
    /// Individual requests can still opt out.
    pub attach_device_metadata: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com".to_string(),
            refresh_buffer: Duration::from_secs(120),
            request_timeout: Duration::from_secs(15),
            default_token_ttl: DEFAULT_TOKEN_TTL,
            attach_device_metadata: true,
        }
    }
}

/// Device/platform metadata merged into non-GET JSON request bodies.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Platform name (e.g. "ios", "android").
    pub platform: String,
    /// OS version string.
    pub platform_version: String,
    /// Viewport width in points.
    pub viewport_width: u32,
    /// Viewport height in points.
    pub viewport_height: u32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: "unknown".to_string(),
            platform_version: "0".to_string(),
            viewport_width: 0,
            viewport_height: 0,
        }
    }
}
