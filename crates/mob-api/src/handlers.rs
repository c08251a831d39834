//! Route handler functions for all API endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mob_action::{DispatchRequest, OutcomeStatus};
use mob_chat::ChatReply;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderRequest {
    pub action: String,
    #[serde(default)]
    pub passkey: Option<String>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub action: String,
    pub status: OutcomeStatus,
    pub result: Value,
    pub duration_ms: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /healthz
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// POST /order - run a configured action.
pub async fn order(
    State(state): State<AppState>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = body?;
    let mut request = DispatchRequest::new(body.action, body.payload.unwrap_or_default());
    if let Some(passkey) = body.passkey {
        request = request.with_passkey(passkey);
    }

    let outcome = state.dispatcher.dispatch(request).await?;
    Ok(Json(OrderResponse {
        duration_ms: outcome.duration_ms(),
        action: outcome.action,
        status: outcome.status,
        result: outcome.result,
    }))
}

/// POST /chat - handle one chat order and return the reply to send.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(body) = body?;
    let reply = state.chat.handle_message(&body.message).await?;
    Ok(Json(reply))
}

/// GET /actions - the action catalogue with secrets removed.
pub async fn actions(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.dispatcher.catalogue().await?))
}
