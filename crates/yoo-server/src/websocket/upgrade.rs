//! Authenticated HTTP handlers: the WebSocket upgrade and token refresh.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::response::Response;
use tracing::{info, warn};
use yoo_auth::{AuthenticatedUser, TokenPair};

use super::transport::split_socket;
use crate::error::ServerError;
use crate::server::AppState;

/// The identity attached by the authentication middleware.
#[derive(Clone, Debug)]
pub struct Identity(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(Identity)
            .ok_or(ServerError::MissingIdentity)
    }
}

/// GET /yoo-chat
pub async fn yoo_chat(
    State(state): State<AppState>,
    Identity(user): Identity,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ServerError> {
    let ws = ws.map_err(|rejection| ServerError::Upgrade(rejection.body_text()))?;

    let connections = Arc::clone(&state.connections);
    let user_id = user.user_id;
    Ok(ws
        .max_message_size(state.max_message_size)
        .on_failed_upgrade(|err| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let (transport, inbound) = split_socket(socket);
            let _ = connections.run(user_id, Arc::new(transport), inbound).await;
        }))
}

/// POST /refreshToken
pub async fn refresh_token(
    State(state): State<AppState>,
    Identity(user): Identity,
) -> Result<Json<TokenPair>, ServerError> {
    let pair = state.issuer.issue_pair(user.user_id.as_str())?;
    info!(user_id = %user.user_id, "issued refreshed token pair");
    Ok(Json(pair))
}
