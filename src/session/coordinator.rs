//! Token refresh coordinator — single-flight session renewal.
//!
//! At most one renewal runs at any time. The first caller that discovers
//! the need creates the operation; every other concurrent caller awaits the
//! same shared future instead of starting its own. The operation itself is
//! a spawned task, so a caller abandoning its request never cancels a
//! renewal that other callers are waiting on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth_api::AuthApi;
use crate::config::PipelineConfig;
use crate::invalidate::InvalidationSignal;
use crate::pipeline::context::RequestContext;
use crate::session::store::SessionStore;

/// The shared in-flight renewal. Resolves to the new access token, or
/// `None` when the refresh failed and the session was invalidated.
type RefreshOperation = Shared<BoxFuture<'static, Option<String>>>;

/// Decides when renewal is needed and guarantees at most one in-flight
/// renewal at a time.
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    auth: Arc<dyn AuthApi>,
    invalidation: Arc<InvalidationSignal>,
    refresh_buffer: Duration,
    in_flight: Mutex<Option<RefreshOperation>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        auth: Arc<dyn AuthApi>,
        invalidation: Arc<InvalidationSignal>,
        config: &PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            auth,
            invalidation,
            refresh_buffer: config.refresh_buffer,
            in_flight: Mutex::new(None),
        })
    }

    /// Return a token suitable for attaching to `context`'s request,
    /// renewing proactively when the current one is inside the refresh
    /// buffer.
    ///
    /// Auth endpoints get the current token unchanged — a refresh call must
    /// never recursively try to refresh itself. When renewal is impossible
    /// (no refresh token) the stale token is returned unchanged and the
    /// server's 401 drives recovery through the retry path instead.
    pub async fn ensure_fresh_token(self: &Arc<Self>, context: &RequestContext) -> Option<String> {
        let session = self.store.get().await;

        if context.is_auth_endpoint {
            return session.access_token;
        }

        let access_token = session.access_token.clone()?;

        let now_ms = Utc::now().timestamp_millis();
        if !session.expiring_soon(self.refresh_buffer, now_ms) {
            return Some(access_token);
        }

        if session.refresh_token.is_none() {
            debug!(
                request_id = %context.request_id,
                "Token expiring but no refresh token; sending stale token"
            );
            return Some(access_token);
        }

        self.join_or_start().await.await
    }

    /// Forced renewal for the 401 retry path. Joins any in-flight
    /// operation; skips the expiry check entirely.
    ///
    /// Returns `None` without attempting renewal for auth endpoints and for
    /// sessions without a refresh token.
    pub async fn refresh_now(self: &Arc<Self>, context: &RequestContext) -> Option<String> {
        if context.is_auth_endpoint {
            return None;
        }
        if self.store.get().await.refresh_token.is_none() {
            return None;
        }
        self.join_or_start().await.await
    }

    /// Get the current in-flight operation, or create one.
    ///
    /// The task clears the slot itself when it settles, so a later renewal
    /// starts a fresh operation instead of observing a stale result.
    async fn join_or_start(self: &Arc<Self>) -> RefreshOperation {
        let mut slot = self.in_flight.lock().await;
        if let Some(operation) = slot.as_ref() {
            debug!("Joining in-flight token refresh");
            return operation.clone();
        }

        let started_at = Utc::now();
        info!(started_at = %started_at, "Starting token refresh");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = this.run_refresh().await;
            this.in_flight.lock().await.take();
            result
        });

        let operation: RefreshOperation =
            async move { handle.await.unwrap_or(None) }.boxed().shared();
        *slot = Some(operation.clone());
        operation
    }

    /// Perform one renewal round-trip against the Auth API.
    async fn run_refresh(&self) -> Option<String> {
        let session = self.store.get().await;
        let refresh_token = session.refresh_token?;

        match self.auth.refresh(&refresh_token).await {
            Ok(grant) => {
                if let Err(e) = self
                    .store
                    .set(
                        &grant.access_token,
                        grant.refresh_token.as_deref(),
                        grant.expires_in,
                    )
                    .await
                {
                    // In-memory session is already updated; the running
                    // process stays usable.
                    warn!(error = %e, "Failed to persist renewed session");
                }
                info!("Token refresh succeeded");
                Some(grant.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; invalidating session");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to clear session after refresh failure");
                }
                self.invalidation.fire();
                None
            }
        }
    }
}
