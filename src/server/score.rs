use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::bail_server;
use crate::error::{ServerError, ServerResult};
use crate::generation::generate_blocking;
use crate::server::state::AppState;

#[derive(Deserialize, Serialize, Debug)]
pub struct ScoreRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ScoreResponse {
    pub result: String,
}

#[axum_macros::debug_handler]
pub async fn handle_score(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> ServerResult<Json<ScoreResponse>> {
    let Some(model) = state.slot.model() else {
        return Err(ServerError::not_loaded());
    };
    let Json(request) = payload
        .map_err(|rejection| ServerError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;
    if request.prompt.trim().is_empty() {
        bail_server!(StatusCode::BAD_REQUEST, "Missing prompt");
    }

    let params = state
        .limits
        .sampling(request.max_tokens, request.temperature);
    let outcome = generate_blocking(model, request.prompt, params).await?;

    Ok(Json(ScoreResponse {
        result: outcome.response,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_snake_case_fields() {
        let request: ScoreRequest =
            serde_json::from_str(r#"{"prompt":"Rate this","max_tokens":5}"#).unwrap();
        assert_eq!(request.max_tokens, Some(5));
        assert_eq!(request.temperature, None);
    }

    #[test]
    fn prompt_is_required() {
        assert!(serde_json::from_str::<ScoreRequest>(r#"{"max_tokens":5}"#).is_err());
    }
}
