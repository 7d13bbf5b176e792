//! Authpipe — authenticated HTTP request pipeline for the onboarding client.
//!
//! Everything the client sends goes through one ordered pipeline:
//! attach metadata → ensure fresh token → send → classify outcome →
//! retry-or-notify. Token renewal is single-flight: concurrent requests
//! that discover an expiring token share exactly one refresh call.

pub mod auth_api;
pub mod config;
pub mod error;
pub mod invalidate;
pub mod notify;
pub mod pipeline;
pub mod session;
pub mod transport;

pub use auth_api::{AuthApi, HttpAuthApi, TokenGrant};
pub use config::{DeviceInfo, PipelineConfig};
pub use error::{ApiError, AuthError, Result, StoreError, TransportError};
pub use invalidate::{InvalidationSignal, SessionInvalidated};
pub use notify::{ToastKind, ToastMessage, ToastQueue};
pub use pipeline::{ApiRequest, ApiResponse, MultipartPart, Pipeline, RequestBody, RequestContext};
pub use session::{FileStorage, KvStorage, MemoryStorage, RefreshCoordinator, Session, SessionStore};
pub use transport::{HttpTransport, Transport};
