//! Session store — the single owner of persisted credentials.
//!
//! All reads and writes of the access token, refresh token, and expiry go
//! through this component. The access token and its expiry are always
//! written together under one lock, so callers never observe a new token
//! paired with a stale expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_TOKEN_TTL;
use crate::error::StoreError;
use crate::session::storage::KvStorage;

const KEY_ACCESS_TOKEN: &str = "auth.access_token";
const KEY_REFRESH_TOKEN: &str = "auth.refresh_token";
const KEY_EXPIRES_AT: &str = "auth.expires_at";

/// Current session credentials.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Short-lived credential attached to authenticated requests.
    pub access_token: Option<String>,
    /// Longer-lived credential used solely to obtain a new access token.
    pub refresh_token: Option<SecretString>,
    /// Access token expiry, epoch milliseconds.
    pub expires_at: Option<i64>,
    /// Whether a session is currently established.
    pub is_authenticated: bool,
}

impl Session {
    /// Whether the access token is inside the proactive-renewal window.
    ///
    /// A session without an expiry is never considered expiring; the
    /// server's own authorization check is the backstop.
    pub fn expiring_soon(&self, buffer: Duration, now_ms: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_ms >= expires_at - buffer.as_millis() as i64,
            None => false,
        }
    }
}

/// Serialized access to the persisted session, with an in-memory cache so
/// repeated reads within one request never race a concurrent write.
pub struct SessionStore {
    storage: Arc<dyn KvStorage>,
    cached: RwLock<Session>,
    default_ttl: Duration,
}

impl SessionStore {
    /// Hydrate the store from persisted storage.
    pub async fn load(storage: Arc<dyn KvStorage>) -> Result<Arc<Self>, StoreError> {
        Self::load_with_ttl(storage, DEFAULT_TOKEN_TTL).await
    }

    /// Hydrate with a non-default token TTL (used when the server omits
    /// `expires_in`).
    pub async fn load_with_ttl(
        storage: Arc<dyn KvStorage>,
        default_ttl: Duration,
    ) -> Result<Arc<Self>, StoreError> {
        let access_token = storage.get(KEY_ACCESS_TOKEN).await?;
        let refresh_token = storage
            .get(KEY_REFRESH_TOKEN)
            .await?
            .map(SecretString::from);
        let expires_at = storage
            .get(KEY_EXPIRES_AT)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok());

        let is_authenticated = access_token.is_some();
        debug!(authenticated = is_authenticated, "Session store hydrated");

        Ok(Arc::new(Self {
            storage,
            cached: RwLock::new(Session {
                access_token,
                refresh_token,
                expires_at,
                is_authenticated,
            }),
            default_ttl,
        }))
    }

    /// Read the current session.
    pub async fn get(&self) -> Session {
        self.cached.read().await.clone()
    }

    /// Store a new token pair.
    ///
    /// `expires_at` is computed as now plus `expires_in` (seconds), falling
    /// back to the default TTL when the server omits it. When no refresh
    /// token is supplied the existing one is retained.
    ///
    /// The in-memory session is updated even if persistence fails, so the
    /// running process keeps a usable session; the persistence error is
    /// still returned for the caller to log.
    pub async fn set(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<u64>,
    ) -> Result<(), StoreError> {
        let ttl_secs = expires_in.unwrap_or(self.default_ttl.as_secs());
        let expires_at = Utc::now().timestamp_millis() + (ttl_secs as i64) * 1000;

        let mut cached = self.cached.write().await;
        cached.access_token = Some(access_token.to_string());
        cached.expires_at = Some(expires_at);
        if let Some(refresh) = refresh_token {
            cached.refresh_token = Some(SecretString::from(refresh.to_string()));
        }
        cached.is_authenticated = true;

        info!(expires_at, "Session tokens updated");

        // Expiry is persisted before the token: a torn write expires an old
        // token early instead of extending a stale one.
        self.storage
            .set(KEY_EXPIRES_AT, &expires_at.to_string())
            .await?;
        if let Some(refresh) = &cached.refresh_token {
            self.storage
                .set(KEY_REFRESH_TOKEN, refresh.expose_secret())
                .await?;
        }
        self.storage.set(KEY_ACCESS_TOKEN, access_token).await?;
        Ok(())
    }

    /// Destroy the session: null all fields and remove persisted keys.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut cached = self.cached.write().await;
        *cached = Session::default();

        info!("Session cleared");

        let mut first_err = None;
        for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_EXPIRES_AT] {
            if let Err(e) = self.storage.remove(key).await {
                warn!(key, error = %e, "Failed to remove persisted session key");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
