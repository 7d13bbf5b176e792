//! Response postprocessor — classifies the outcome and drives the
//! retry-once state machine for authorization failures.
//!
//! Retry-once is per *logical* request: `retried` lives on the request
//! context, so the resend after a refresh carries it and a second 401 goes
//! straight to invalidation.

use tracing::{debug, warn};

use crate::error::ApiError;
use crate::pipeline::context::{ApiResponse, RequestContext};

/// What the pipeline should do with a response.
#[derive(Debug)]
pub(crate) enum Disposition {
    /// Success — hand the response to the caller.
    Done(ApiResponse),
    /// First 401 with a refresh token available: renew and resend once.
    RetryAfterRefresh,
    /// Terminal authorization failure: clear the session, signal
    /// invalidation, reject.
    Invalidate,
    /// Non-auth failure: notify and reject.
    Fail(ApiError),
}

pub(crate) fn evaluate(
    response: ApiResponse,
    context: &RequestContext,
    has_refresh_token: bool,
) -> Disposition {
    if response.is_success() {
        return Disposition::Done(response);
    }

    if response.status == 401 {
        // A failed login/register/refresh is not grounds for renewal.
        if context.is_auth_endpoint {
            debug!(
                request_id = %context.request_id,
                "401 on auth endpoint; rejecting without renewal"
            );
            return Disposition::Fail(ApiError::Client {
                status: 401,
                message: response.error_message(),
            });
        }

        if context.retried() {
            warn!(
                request_id = %context.request_id,
                "401 after retry; invalidating session"
            );
            return Disposition::Invalidate;
        }

        if !has_refresh_token {
            warn!(
                request_id = %context.request_id,
                "401 with no refresh token; invalidating session"
            );
            return Disposition::Invalidate;
        }

        debug!(
            request_id = %context.request_id,
            "401 received; attempting refresh and retry"
        );
        return Disposition::RetryAfterRefresh;
    }

    Disposition::Fail(classify(&response))
}

/// Map a non-401 failure response onto the error taxonomy.
fn classify(response: &ApiResponse) -> ApiError {
    if response.status >= 500 {
        ApiError::Server {
            status: response.status,
        }
    } else {
        ApiError::Client {
            status: response.status,
            message: response.error_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> ApiResponse {
        ApiResponse {
            status,
            body: serde_json::Value::Null,
        }
    }

    #[test]
    fn success_is_done() {
        let disposition = evaluate(response(200), &RequestContext::new(), true);
        assert!(matches!(disposition, Disposition::Done(_)));
    }

    #[test]
    fn first_401_with_refresh_token_retries() {
        let disposition = evaluate(response(401), &RequestContext::new(), true);
        assert!(matches!(disposition, Disposition::RetryAfterRefresh));
    }

    #[test]
    fn second_401_invalidates() {
        let mut context = RequestContext::new();
        context.mark_retried();
        let disposition = evaluate(response(401), &context, true);
        assert!(matches!(disposition, Disposition::Invalidate));
    }

    #[test]
    fn first_401_without_refresh_token_invalidates() {
        let disposition = evaluate(response(401), &RequestContext::new(), false);
        assert!(matches!(disposition, Disposition::Invalidate));
    }

    #[test]
    fn auth_endpoint_401_rejects_without_renewal() {
        let response = ApiResponse {
            status: 401,
            body: serde_json::json!({"message": "Wrong password"}),
        };
        let disposition = evaluate(response, &RequestContext::auth_endpoint(), true);
        match disposition {
            Disposition::Fail(ApiError::Client { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message.as_deref(), Some("Wrong password"));
            }
            other => panic!("Expected Fail(Client), got {other:?}"),
        }
    }

    #[test]
    fn five_xx_maps_to_server_error() {
        for status in [500, 502, 503, 504] {
            let disposition = evaluate(response(status), &RequestContext::new(), true);
            match disposition {
                Disposition::Fail(ApiError::Server { status: s }) => assert_eq!(s, status),
                other => panic!("Expected Fail(Server), got {other:?}"),
            }
        }
    }

    #[test]
    fn other_4xx_maps_to_client_error_with_message() {
        let response = ApiResponse {
            status: 422,
            body: serde_json::json!({"message": "Email already taken"}),
        };
        let disposition = evaluate(response, &RequestContext::new(), true);
        match disposition {
            Disposition::Fail(ApiError::Client { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message.as_deref(), Some("Email already taken"));
            }
            other => panic!("Expected Fail(Client), got {other:?}"),
        }
    }
}
