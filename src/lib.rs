pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use detection::{CheckpointCache, DetectorOptions};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub detectors: Arc<CheckpointCache>,
}

impl AppState {
    /// State whose detectors are ONNX checkpoints loaded per `config`
    pub fn new(config: Config) -> Self {
        let options = DetectorOptions::new()
            .with_device(config.device)
            .with_intra_threads(config.intra_threads);
        let detectors = CheckpointCache::new(options, config.confidence_threshold);
        Self::with_detectors(config, detectors)
    }

    pub fn with_detectors(config: Config, detectors: CheckpointCache) -> Self {
        Self {
            config: Arc::new(config),
            detectors: Arc::new(detectors),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let body_limit = match state.config.max_body_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .merge(routes::api_router())
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
