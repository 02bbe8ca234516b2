//! Outbox submission endpoint
//!
//! Accepts a plaintext note from an authenticated local account and
//! fans it out to the account's followers.

use axum::{Router, extract::State, response::Json, routing::post};
use serde::Deserialize;

use crate::AppState;
use crate::data::Actor;
use crate::error::AppError;

/// Message submission request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Local account name (without domain)
    pub acct: String,
    pub apikey: String,
    /// Plaintext note content
    pub message: String,
}

/// Create outbox router
///
/// Routes:
/// - POST /api/sendMessage - Deliver a note to all followers
pub fn outbox_router() -> Router<AppState> {
    Router::new().route("/api/sendMessage", post(send_message))
}

/// POST /api/sendMessage
///
/// # Steps
/// 1. Check the account's API key
/// 2. Dispatch to followers
/// 3. Acknowledge once every delivery was attempted
async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let acct = request.acct.trim();
    if acct.is_empty() {
        return Err(AppError::Validation("acct must not be empty".to_string()));
    }

    let actor = Actor::new(acct, state.config.server.domain.as_str());
    let stored_key = state.db.get_api_key(&actor.account_id()).await?;
    if stored_key.as_deref() != Some(request.apikey.as_str()) {
        tracing::warn!(account = %actor.account_id(), "Rejected sendMessage: wrong api key");
        return Err(AppError::Unauthorized);
    }

    let report = state.dispatcher.deliver(&request.message, &actor).await?;
    tracing::debug!(
        account = %actor.account_id(),
        attempted = report.attempted(),
        succeeded = report.succeeded(),
        "sendMessage accepted"
    );

    Ok(Json(serde_json::json!({ "msg": "ok" })))
}
