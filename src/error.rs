//! Error types for the request pipeline.

/// Top-level error returned to callers of the pipeline.
///
/// `AuthExpiredFirst` never escapes the pipeline — a first 401 is resolved
/// internally by the refresh-and-retry cycle. Callers only ever observe
/// `AuthExpiredTerminal` once the session is unrecoverable.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authorization expired (recoverable)")]
    AuthExpiredFirst,

    #[error("Session expired")]
    AuthExpiredTerminal,

    #[error("Server error (status {status})")]
    Server { status: u16 },

    #[error("Request failed (status {status})")]
    Client { status: u16, message: Option<String> },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Whether this error terminated the session.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, Self::AuthExpiredTerminal)
    }
}

/// Persisted session storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Auth API errors (refresh endpoint).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Refresh token rejected")]
    Unauthorized,

    #[error("Auth request failed: {0}")]
    Request(String),

    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),
}

/// Transport errors — the request never produced a response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, ApiError>;
