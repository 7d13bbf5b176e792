//! End-to-end concurrency properties of the request pipeline: single-flight
//! renewal across concurrent requests, and at-most-once invalidation when
//! renewal fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;

use authpipe::{
    ApiError, ApiRequest, ApiResponse, AuthApi, AuthError, DeviceInfo, MemoryStorage, Pipeline,
    PipelineConfig, SessionStore, TokenGrant, Transport, TransportError,
};

/// Transport that accepts exactly one bearer token and 401s everything else.
struct TokenCheckingTransport {
    valid_bearer: String,
    sent: Mutex<Vec<ApiRequest>>,
}

impl TokenCheckingTransport {
    fn accepting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_bearer: format!("Bearer {token}"),
            sent: Mutex::new(Vec::new()),
        })
    }

    async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    async fn all_sends_used_token(&self, token: &str) -> bool {
        let expected = format!("Bearer {token}");
        self.sent.lock().await.iter().all(|request| {
            request
                .headers
                .iter()
                .any(|(name, value)| name.eq_ignore_ascii_case("authorization") && *value == expected)
        })
    }
}

#[async_trait]
impl Transport for TokenCheckingTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.sent.lock().await.push(request.clone());
        let authorized = request
            .headers
            .iter()
            .any(|(name, value)| {
                name.eq_ignore_ascii_case("authorization") && *value == self.valid_bearer
            });
        Ok(ApiResponse {
            status: if authorized { 200 } else { 401 },
            body: serde_json::Value::Null,
        })
    }
}

/// Auth API with a scripted outcome, a small latency, and a call counter.
struct CountingAuthApi {
    calls: AtomicUsize,
    grant: Option<String>,
}

impl CountingAuthApi {
    fn granting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            grant: Some(token.to_string()),
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            grant: None,
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for CountingAuthApi {
    async fn refresh(&self, _refresh_token: &SecretString) -> Result<TokenGrant, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        match &self.grant {
            Some(token) => Ok(TokenGrant {
                access_token: token.clone(),
                refresh_token: Some("rotated-refresh".to_string()),
                expires_in: Some(600),
            }),
            None => Err(AuthError::Unauthorized),
        }
    }
}

async fn pipeline_with(
    transport: Arc<TokenCheckingTransport>,
    auth: Arc<CountingAuthApi>,
    token_ttl_secs: u64,
) -> Arc<Pipeline> {
    let store = SessionStore::load(MemoryStorage::new()).await.unwrap();
    store
        .set("expired-token", Some("refresh-1"), Some(token_ttl_secs))
        .await
        .unwrap();
    Pipeline::new(
        &PipelineConfig::default(),
        DeviceInfo::default(),
        store,
        transport,
        auth,
    )
}

#[tokio::test]
async fn three_expired_concurrent_requests_share_one_refresh() {
    let transport = TokenCheckingTransport::accepting("new-token");
    let auth = CountingAuthApi::granting("new-token");
    // TTL 0 → already expired when the requests fire
    let pipeline = pipeline_with(transport.clone(), auth.clone(), 0).await;

    let mut handles = Vec::new();
    for i in 0..3 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.execute(ApiRequest::get(format!("/screen/{i}"))).await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
    }

    // Exactly one refresh; every original request went out with the newly
    // issued token, so nothing needed the 401 retry path.
    assert_eq!(auth.call_count(), 1);
    assert_eq!(transport.sent_count().await, 3);
    assert!(transport.all_sends_used_token("new-token").await);
}

#[tokio::test]
async fn ten_concurrent_requests_inside_buffer_share_one_refresh() {
    let transport = TokenCheckingTransport::accepting("new-token");
    let auth = CountingAuthApi::granting("new-token");
    // 60s of life left with a 120s buffer → inside the renewal window
    let pipeline = pipeline_with(transport.clone(), auth.clone(), 60).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.execute(ApiRequest::get(format!("/screen/{i}"))).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(auth.call_count(), 1);
    assert!(transport.all_sends_used_token("new-token").await);
}

#[tokio::test]
async fn proactive_renewal_happens_before_the_request_is_sent() {
    let transport = TokenCheckingTransport::accepting("new-token");
    let auth = CountingAuthApi::granting("new-token");
    let pipeline = pipeline_with(transport.clone(), auth.clone(), 60).await;

    let response = pipeline.execute(ApiRequest::get("/profile")).await.unwrap();
    assert_eq!(response.status, 200);

    // One renewal, one physical send, and that send already carried the
    // renewed token.
    assert_eq!(auth.call_count(), 1);
    assert_eq!(transport.sent_count().await, 1);
    assert!(transport.all_sends_used_token("new-token").await);
}

#[tokio::test]
async fn failed_refresh_invalidates_exactly_once_across_waiters() {
    let transport = TokenCheckingTransport::accepting("never-issued");
    let auth = CountingAuthApi::rejecting();
    let pipeline = pipeline_with(transport.clone(), auth.clone(), 0).await;
    let mut invalidations = pipeline.invalidation().subscribe();

    let mut handles = Vec::new();
    for i in 0..5 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.execute(ApiRequest::get(format!("/screen/{i}"))).await
        }));
    }

    for handle in handles {
        let error = handle.await.unwrap().unwrap_err();
        assert!(matches!(error, ApiError::AuthExpiredTerminal));
    }

    // One shared refresh attempt, one invalidation event, session gone.
    assert_eq!(auth.call_count(), 1);
    invalidations.recv().await.unwrap();
    assert!(invalidations.try_recv().is_err());
    assert!(!pipeline.session().get().await.is_authenticated);
}

#[tokio::test]
async fn auth_endpoint_requests_are_never_blocked_by_renewal() {
    let transport = TokenCheckingTransport::accepting("expired-token");
    let auth = CountingAuthApi::granting("new-token");
    let pipeline = pipeline_with(transport.clone(), auth.clone(), 0).await;

    // Expired session, yet a login call goes straight through with the
    // current (stale) token and triggers no renewal.
    let response = pipeline
        .execute(
            ApiRequest::post("/auth/login", serde_json::json!({"email": "a@b.c"}))
                .auth_endpoint(),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(auth.call_count(), 0);
}
