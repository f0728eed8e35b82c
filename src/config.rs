use std::env;
use std::path::PathBuf;

use crate::detection::{Device, checkpoint_file_name};

pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub device: Device,
    pub intra_threads: usize,
    pub confidence_threshold: Option<f32>,
    pub max_body_bytes: Option<usize>,
    pub preload_model: bool,
    pub dataset_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4999,
            model_path: PathBuf::from(checkpoint_file_name(2)),
            device: Device::Cpu,
            intra_threads: 4,
            confidence_threshold: None,
            max_body_bytes: None,
            preload_model: true,
            dataset_cache_capacity: 16,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring unparseable {key}={raw}");
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            device: parsed("DEVICE").unwrap_or(defaults.device),
            intra_threads: parsed("INTRA_THREADS").unwrap_or(defaults.intra_threads),
            confidence_threshold: parsed("CONFIDENCE_THRESHOLD"),
            max_body_bytes: parsed("MAX_BODY_BYTES"),
            preload_model: parsed("PRELOAD_MODEL").unwrap_or(defaults.preload_model),
            dataset_cache_capacity: parsed("DATASET_CACHE_CAPACITY")
                .unwrap_or(defaults.dataset_cache_capacity),
        }
    }
}
