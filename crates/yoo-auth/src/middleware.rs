//! Axum authentication middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use crate::header::bearer_from_headers;
use crate::token::TokenIssuer;

/// Counter of rejected requests, labelled by `kind`.
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";

/// Verify the bearer token and attach an [`AuthenticatedUser`] to the request.
///
/// Rejections never reach the inner handler. Use with
/// `axum::middleware::from_fn_with_state(issuer, authenticate)`.
///
/// [`AuthenticatedUser`]: crate::AuthenticatedUser
pub async fn authenticate(
    State(issuer): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Response {
    let result = bearer_from_headers(request.headers()).and_then(|token| issuer.verify(token));

    match result {
        Ok(user) => {
            debug!(user_id = %user.user_id, path = %request.uri().path(), "user authenticated");
            let _ = request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => {
            warn!(error = %err, kind = err.kind(), path = %request.uri().path(), "request rejected");
            counter!(AUTH_FAILURES_TOTAL, "kind" => err.kind()).increment(1);
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{AuthenticatedUser, Claims};
    use axum::Extension;
    use axum::Router;
    use axum::body::Body;
    use axum::http::header::AUTHORIZATION;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use chrono::Utc;
    use secrecy::SecretString;
    use serde_json::json;
    use tower::ServiceExt;
    use yoo_logging::capture_logs;

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::with_defaults(&SecretString::from("middleware-secret")))
    }

    async fn whoami(Extension(user): Extension<AuthenticatedUser>) -> String {
        user.user_id.to_string()
    }

    fn app(issuer: Arc<TokenIssuer>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(from_fn_with_state(issuer, authenticate))
    }

    async fn call(issuer: Arc<TokenIssuer>, auth: Option<&str>) -> (StatusCode, String) {
        let mut req = HttpRequest::builder().uri("/whoami");
        if let Some(auth) = auth {
            req = req.header(AUTHORIZATION, auth);
        }
        let resp = app(issuer)
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_reaches_handler() {
        let issuer = issuer();
        let token = issuer.issue_access("alice").unwrap();
        let (status, body) = call(issuer, Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (status, body) = call(issuer(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["error"], "missing Authorization header");
    }

    #[tokio::test]
    async fn wrong_scheme_is_unauthorized() {
        let (status, _) = call(issuer(), Some("Token abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_header_is_unauthorized() {
        let (status, _) = call(issuer(), Some("")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let token = issuer
            .encode_claims(&Claims {
                sub: "bob".into(),
                iat: now - 10,
                exp: now - 1,
            })
            .unwrap();
        let (status, body) = call(issuer, Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("expired"));
    }

    #[tokio::test]
    async fn malformed_claims_are_bad_request() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let token = issuer
            .encode_claims(&json!({"sub": ["not", "a", "string"], "iat": now, "exp": now + 60}))
            .unwrap();
        let (status, _) = call(issuer, Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejection_is_logged() {
        let (logs, _guard) = capture_logs();
        let (status, _) = call(issuer(), Some("Token abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let events = logs.events();
        let rejected = events
            .iter()
            .find(|e| e.message.contains("request rejected"))
            .unwrap();
        assert_eq!(rejected.level, tracing::Level::WARN);
        assert_eq!(rejected.field("kind"), Some("malformed_header"));
    }
}
