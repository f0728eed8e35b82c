//! HTTP tests for `/process-image`, driven in-process through the router

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat};
use serde_json::{Value, json};
use tower::ServiceExt;

use measure_detector::config::Config;
use measure_detector::detection::{
    CheckpointCache, DetectError, DetectResult, MEASURE_LABEL, MeasureDetector, NormalizedImage,
    RawDetection,
};
use measure_detector::{AppState, app};

/// Returns one measure per 100px column that contains any non-zero pixel
struct ColumnDetector;

impl MeasureDetector for ColumnDetector {
    fn predict(&self, image: &NormalizedImage) -> DetectResult<Vec<RawDetection>> {
        let columns = image.width().div_ceil(100);
        Ok((0..columns)
            .map(|i| RawDetection {
                corners: [i as f32 * 100.0, 0.0, i as f32 * 100.0 + 90.0, image.height() as f32],
                score: 0.9,
                label: MEASURE_LABEL,
            })
            .collect())
    }
}

struct EmptyDetector;

impl MeasureDetector for EmptyDetector {
    fn predict(&self, _image: &NormalizedImage) -> DetectResult<Vec<RawDetection>> {
        Ok(vec![])
    }
}

fn state_with<D: MeasureDetector + 'static>(detector: D, loads: Arc<AtomicUsize>) -> AppState {
    let detector: Arc<dyn MeasureDetector> = Arc::new(detector);
    let cache = CheckpointCache::with_loader(
        move |_path: &Path| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(detector.clone())
        },
        None,
    );
    AppState::with_detectors(Config::default(), cache)
}

fn data_url(img: &DynamicImage) -> String {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
}

async fn post(state: AppState, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/process-image")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_returns_boxes_as_xywh() {
    let state = state_with(ColumnDetector, Arc::default());
    let body = json!({ "imageData": data_url(&DynamicImage::new_luma8(250, 80)) });
    let (status, json) = post(state, body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    let boxes = json.as_array().unwrap();
    assert_eq!(boxes.len(), 3);
    assert_eq!(boxes[1], json!({ "x": 100.0, "y": 0.0, "w": 90.0, "h": 80.0 }));
}

#[tokio::test]
async fn test_zero_measures_is_empty_array() {
    let state = state_with(EmptyDetector, Arc::default());
    let body = json!({ "imageData": data_url(&DynamicImage::new_luma8(300, 300)) });
    let (status, json) = post(state, body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_color_jpeg_accepted() {
    let state = state_with(ColumnDetector, Arc::default());
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(120, 60)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    let url = format!("data:image/jpeg;base64,{}", STANDARD.encode(buf.into_inner()));
    let (status, json) = post(state, json!({ "imageData": url }).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_detector_loaded_once_across_requests() {
    let loads = Arc::new(AtomicUsize::new(0));
    let state = state_with(EmptyDetector, loads.clone());
    let body = json!({ "imageData": data_url(&DynamicImage::new_luma8(10, 10)) }).to_string();

    for _ in 0..3 {
        let (status, _) = post(state.clone(), body.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_image_data_is_client_error() {
    let state = state_with(EmptyDetector, Arc::default());
    let (status, json) = post(state, json!({ "image": "data:," }).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_malformed_json_is_client_error() {
    let state = state_with(EmptyDetector, Arc::default());
    let (status, _) = post(state, "{ not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_base64_is_client_error() {
    let state = state_with(EmptyDetector, Arc::default());
    let body = json!({ "imageData": "data:image/png;base64,!!!not-base64!!!" });
    let (status, json) = post(state, body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("base64"));
}

#[tokio::test]
async fn test_undecodable_image_is_client_error() {
    let state = state_with(EmptyDetector, Arc::default());
    let url = format!("data:image/png;base64,{}", STANDARD.encode(b"plain text, not pixels"));
    let (status, _) = post(state, json!({ "imageData": url }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_image_rejected() {
    let state = state_with(EmptyDetector, Arc::default());
    let body = json!({ "imageData": data_url(&DynamicImage::new_luma8(1201, 400)) });
    let (status, json) = post(state, body.to_string()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("too large"));
}

#[tokio::test]
async fn test_missing_checkpoint_is_server_error() {
    let cache = CheckpointCache::with_loader(
        |path: &Path| Err(DetectError::CheckpointNotFound(path.to_path_buf())),
        None,
    );
    let state = AppState::with_detectors(Config::default(), cache);
    let body = json!({ "imageData": data_url(&DynamicImage::new_luma8(10, 10)) });
    let (status, json) = post(state, body.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Internal server error");
}

#[tokio::test]
async fn test_server_survives_bad_requests() {
    let state = state_with(ColumnDetector, Arc::default());
    let (status, _) = post(state.clone(), json!({}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "imageData": data_url(&DynamicImage::new_luma8(100, 100)) });
    let (status, json) = post(state, body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_large_body_accepted_by_default() {
    let state = state_with(EmptyDetector, Arc::default());
    // Incompressible RGB noise keeps the body well above axum's default 2 MB limit
    let mut seed = 0x2545_f491_u32;
    let noisy = image::RgbImage::from_fn(1200, 1200, |_, _| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        image::Rgb([seed as u8, (seed >> 8) as u8, (seed >> 16) as u8])
    });
    let url = data_url(&DynamicImage::ImageRgb8(noisy));
    let (status, _) = post(state, json!({ "imageData": url }).to_string()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_loaded_model() {
    let state = state_with(EmptyDetector, Arc::default());
    state.detectors.get_or_load(&state.config.model_path).unwrap();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["loaded"], true);
    assert_eq!(json["model"], "model.RCNN.2.onnx");
}
