//! Error notifier — maps failures onto user-facing toasts.
//!
//! One toast per failed request, unless the request opted out. Toasts fan
//! out over a broadcast channel; the display layer consumes and discards
//! them in `sequence` order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// How long a toast stays on screen by default.
const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(4);

const NETWORK_ERROR_MESSAGE: &str = "Network error. Check your connection and try again.";
const SERVER_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

/// A message for the display layer.
#[derive(Debug, Clone)]
pub struct ToastMessage {
    pub id: Uuid,
    pub kind: ToastKind,
    pub message: String,
    pub duration: Duration,
    /// Monotonically increasing display order.
    pub sequence: u64,
}

/// Toast fan-out queue.
pub struct ToastQueue {
    tx: broadcast::Sender<ToastMessage>,
    sequence: AtomicU64,
}

impl ToastQueue {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            tx,
            sequence: AtomicU64::new(0),
        })
    }

    /// Subscribe to toast events. The display layer calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<ToastMessage> {
        self.tx.subscribe()
    }

    /// Enqueue a toast.
    pub fn enqueue(&self, kind: ToastKind, message: impl Into<String>, duration: Duration) {
        let toast = ToastMessage {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            duration,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        };
        debug!(toast_id = %toast.id, kind = ?toast.kind, "Toast enqueued");
        // Ok if no display layer is listening yet
        let _ = self.tx.send(toast);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.enqueue(ToastKind::Success, message, DEFAULT_TOAST_DURATION);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.enqueue(ToastKind::Error, message, DEFAULT_TOAST_DURATION);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.enqueue(ToastKind::Info, message, DEFAULT_TOAST_DURATION);
    }

    /// Surface a failed request. Emits exactly one error toast unless the
    /// request opted out or the error has no user-facing message (a 401
    /// still inside the retry cycle).
    pub(crate) fn notify_failure(&self, error: &ApiError, skip_error_toast: bool) {
        if skip_error_toast {
            debug!("Error toast suppressed by request flag");
            return;
        }
        if let Some(message) = user_message(error) {
            self.error(message);
        }
    }
}

/// User-facing message for an error, `None` when the failure is silent.
fn user_message(error: &ApiError) -> Option<String> {
    match error {
        ApiError::Network(_) => Some(NETWORK_ERROR_MESSAGE.to_string()),
        // Still inside the refresh-and-retry cycle; silent until terminal.
        ApiError::AuthExpiredFirst => None,
        ApiError::AuthExpiredTerminal => Some(SESSION_EXPIRED_MESSAGE.to_string()),
        ApiError::Server { .. } => Some(SERVER_ERROR_MESSAGE.to_string()),
        ApiError::Client { message, .. } => Some(
            message
                .clone()
                .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
        ),
        ApiError::Validation(message) => Some(message.clone()),
        ApiError::Store(_) => Some(GENERIC_ERROR_MESSAGE.to_string()),
    }
}
