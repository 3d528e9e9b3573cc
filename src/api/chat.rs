//! Chat completion endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::Error;

use super::ApiState;

/// Build the chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .with_state(state)
}

/// Chat request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// User transcript to complete
    pub message: String,
    /// Override the server-side caching default
    pub enable_caching: Option<bool>,
    /// Reply locale override (cache keys are locale-prefixed)
    pub language: Option<String>,
}

/// Chat response body
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The completion text
    pub content: String,
}

/// Complete a transcript into a short reply
async fn chat(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    if request.message.trim().is_empty() {
        return Err(ChatError(Error::Config(
            "message must not be empty".to_string(),
        )));
    }

    let mut settings = state.defaults;
    if let Some(enabled) = request.enable_caching {
        settings.caching_enabled = enabled;
    }

    let content = state
        .completion
        .complete_in(&request.message, settings, request.language.as_deref())
        .await
        .map_err(ChatError)?;

    Ok(Json(ChatResponse { content }))
}

/// Error wrapper mapping pipeline failures onto the wire contract
#[derive(Debug)]
pub struct ChatError(pub Error);

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            timestamp: String,
            retryable: bool,
        }

        let status = match self.0 {
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            error: self.0.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            retryable: self.0.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}
