//! The request pipeline — ordered stages over a request context.
//!
//! attach metadata → ensure fresh token → send → classify outcome →
//! retry-or-notify. Each stage is explicit; there is no middleware
//! registration.

pub mod context;
pub(crate) mod postprocess;
pub(crate) mod preprocess;

pub use context::{ApiRequest, ApiResponse, MultipartPart, RequestBody, RequestContext};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth_api::{AuthApi, TokenGrant};
use crate::config::{DeviceInfo, PipelineConfig};
use crate::error::{ApiError, Result, StoreError};
use crate::invalidate::InvalidationSignal;
use crate::notify::ToastQueue;
use crate::pipeline::postprocess::Disposition;
use crate::session::coordinator::RefreshCoordinator;
use crate::session::store::SessionStore;
use crate::transport::Transport;

/// The authenticated request pipeline.
///
/// Owns the refresh coordinator, the toast queue, and the invalidation
/// signal; consumes the session store, transport, and auth API as
/// collaborators.
pub struct Pipeline {
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    toasts: Arc<ToastQueue>,
    invalidation: Arc<InvalidationSignal>,
    device: DeviceInfo,
    attach_device_metadata: bool,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        device: DeviceInfo,
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthApi>,
    ) -> Arc<Self> {
        let invalidation = InvalidationSignal::new();
        let coordinator =
            RefreshCoordinator::new(store.clone(), auth, invalidation.clone(), config);
        Arc::new(Self {
            coordinator,
            store,
            transport,
            toasts: ToastQueue::new(),
            invalidation,
            device,
            attach_device_metadata: config.attach_device_metadata,
        })
    }

    /// Toast fan-out for the display layer.
    pub fn toasts(&self) -> &Arc<ToastQueue> {
        &self.toasts
    }

    /// Session-invalidated fan-out for the navigation controller and
    /// dependent caches.
    pub fn invalidation(&self) -> &Arc<InvalidationSignal> {
        &self.invalidation
    }

    /// The session store (read access for screens that display auth state).
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Record a new session after a successful login or registration and
    /// re-arm the invalidation latch.
    pub async fn establish_session(&self, grant: &TokenGrant) -> std::result::Result<(), StoreError> {
        self.store
            .set(
                &grant.access_token,
                grant.refresh_token.as_deref(),
                grant.expires_in,
            )
            .await?;
        self.invalidation.reset();
        Ok(())
    }

    /// Run one logical request through the pipeline.
    ///
    /// On a first 401 (non-auth endpoint, refresh token present) the
    /// request is resent exactly once after a shared renewal; any further
    /// 401 is terminal. Terminal auth failures clear the session, fire the
    /// invalidation signal at most once, and reject with
    /// [`ApiError::AuthExpiredTerminal`].
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        if !self.attach_device_metadata {
            request.context.attach_device_metadata = false;
        }
        let mut current = preprocess::prepare(request, &self.coordinator, &self.device).await;

        loop {
            let response = match self.transport.send(&current).await {
                Ok(response) => response,
                Err(e) => {
                    return self.fail(&current.context, ApiError::Network(e.to_string()));
                }
            };

            let has_refresh_token = self.store.get().await.refresh_token.is_some();
            match postprocess::evaluate(response, &current.context, has_refresh_token) {
                Disposition::Done(response) => return Ok(response),
                Disposition::Fail(error) => return self.fail(&current.context, error),
                Disposition::Invalidate => return self.invalidate(&current.context).await,
                Disposition::RetryAfterRefresh => {
                    current.context.mark_retried();
                    match self.coordinator.refresh_now(&current.context).await {
                        Some(token) => {
                            debug!(
                                request_id = %current.context.request_id,
                                "Resending request with renewed token"
                            );
                            current.set_bearer(&token);
                        }
                        None => return self.invalidate(&current.context).await,
                    }
                }
            }
        }
    }

    /// Terminal rejection with notification.
    fn fail(&self, context: &RequestContext, error: ApiError) -> Result<ApiResponse> {
        self.toasts.notify_failure(&error, context.skip_error_toast);
        Err(error)
    }

    /// Terminal session invalidation. Clearing an already-cleared session
    /// is a no-op and the signal latch guarantees a single navigation
    /// reset, so concurrent arrivals here just reject.
    async fn invalidate(&self, context: &RequestContext) -> Result<ApiResponse> {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear session during invalidation");
        }
        self.invalidation.fire();
        self.fail(context, ApiError::AuthExpiredTerminal)
    }
}
