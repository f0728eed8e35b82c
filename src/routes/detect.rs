use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::detection::{Detection, decode_image};
use crate::error::AppError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessImageRequest {
    image_data: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process-image", post(process_image))
        .route("/health", get(health))
}

/// Payload bytes of a `data:<mime>;base64,<payload>` URL.
/// Everything up to the first comma is treated as the header and dropped.
fn decode_data_url(data_url: &str) -> Result<Vec<u8>, AppError> {
    let (_header, encoded) = data_url
        .split_once(',')
        .ok_or_else(|| AppError::BadRequest("imageData is not a data URL".into()))?;
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 image data: {e}")))
}

async fn process_image(
    State(state): State<AppState>,
    payload: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> Result<Json<Vec<Detection>>, AppError> {
    let Json(body) = payload?;
    let bytes = decode_data_url(&body.image_data)?;

    let detectors = state.detectors.clone();
    let model_path = state.config.model_path.clone();
    let detections = tokio::task::spawn_blocking(move || {
        let image = decode_image(&bytes)?;
        let engine = detectors.get_or_load(&model_path)?;
        engine.detect(&image)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Inference task failed: {e}")))??;

    tracing::info!(measures = detections.len(), "processed image");
    Ok(Json(detections))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let model = &state.config.model_path;
    Json(json!({
        "status": "ok",
        "model": model.display().to_string(),
        "loaded": state.detectors.is_loaded(model),
    }))
}
