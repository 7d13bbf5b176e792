//! Session invalidation signal.
//!
//! Terminal auth failures fan out to subscribers (navigation controller,
//! request cache) over a broadcast channel. The signal fires at most once
//! per session: concurrent terminal failures race on an atomic latch, and
//! only the winner broadcasts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Broadcast channel capacity. Subscribers react immediately; a small
/// buffer is plenty.
const SIGNAL_CAPACITY: usize = 16;

/// Event delivered to subscribers when the session becomes unrecoverable.
#[derive(Debug, Clone)]
pub struct SessionInvalidated {
    /// When the invalidation was declared.
    pub at: DateTime<Utc>,
}

/// At-most-once session invalidation fan-out.
pub struct InvalidationSignal {
    tx: broadcast::Sender<SessionInvalidated>,
    fired: AtomicBool,
}

impl InvalidationSignal {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(SIGNAL_CAPACITY);
        Arc::new(Self {
            tx,
            fired: AtomicBool::new(false),
        })
    }

    /// Subscribe to invalidation events. The navigation controller resets
    /// to the login screen on receipt; caches clear themselves.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionInvalidated> {
        self.tx.subscribe()
    }

    /// Declare the session invalid. Returns `true` for the caller that
    /// actually fired the signal; later callers get `false` and must simply
    /// reject their own request.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Session already invalidated; not re-firing");
            return false;
        }

        info!("Session invalidated — signaling navigation reset");
        // Ok if nobody is subscribed yet
        let _ = self.tx.send(SessionInvalidated { at: Utc::now() });
        true
    }

    /// Whether the signal has fired for the current session.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Re-arm the latch. Called after a successful login or registration
    /// establishes a new session.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }
}
