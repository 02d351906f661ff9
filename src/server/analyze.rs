use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bail_server;
use crate::error::{ServerError, ServerResult};
use crate::generation::generate_blocking;
use crate::imaging::{decode_base64_image, IMAGE_PROMPT_CUE};
use crate::inference::model::Quantization;
use crate::server::state::AppState;

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f64>,
    /// Base64 encoded image, optionally as a data URL
    pub image_data: Option<String>,
    /// Not fetched, callers are asked to send `imageData` instead
    pub image_url: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub response: String,
    pub processing_time: f64,
    pub tokens_used: usize,
    pub model: String,
    pub quantization: Quantization,
}

#[axum_macros::debug_handler]
pub async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ServerResult<Json<AnalyzeResponse>> {
    let Some(model) = state.slot.model() else {
        return Err(ServerError::not_loaded());
    };
    let Json(request) = payload
        .map_err(|rejection| ServerError::new(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    let prompt = build_prompt(&request, state.max_image_size)?;
    if prompt.trim().is_empty() {
        bail_server!(StatusCode::BAD_REQUEST, "Missing prompt");
    }
    let params = state
        .limits
        .sampling(request.max_tokens, request.temperature);
    info!(
        "Analyze request: max_new_tokens={}, temperature={}",
        params.max_new_tokens, params.temperature
    );

    let quantization = model.quantization();
    let outcome = generate_blocking(model, prompt, params).await?;

    Ok(Json(AnalyzeResponse {
        success: true,
        response: outcome.response,
        processing_time: outcome.processing_time,
        tokens_used: outcome.tokens_used,
        model: state.model_name.clone(),
        quantization,
    }))
}

/// Applies the image cue to the prompt.
///
/// The decoded pixels are not handed to the model, generation is text only.
fn build_prompt(request: &AnalyzeRequest, max_image_size: u32) -> ServerResult<String> {
    match (&request.image_data, &request.image_url) {
        (Some(data), _) => match decode_base64_image(data, max_image_size) {
            Ok(image) => {
                let (width, height) = image.dimensions();
                warn!(
                    "Image of {}x{} decoded but not passed to the model, only a prompt cue is added",
                    width, height
                );
                Ok(format!("{IMAGE_PROMPT_CUE}{}", request.prompt))
            }
            Err(err) => {
                warn!("Error processing image: {}", err);
                Ok(request.prompt.clone())
            }
        },
        (None, Some(_)) => bail_server!(
            StatusCode::BAD_REQUEST,
            "Please provide imageData as base64 instead of imageUrl"
        ),
        (None, None) => Ok(request.prompt.clone()),
    }
}
