use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing_subscriber::EnvFilter;

use measure_detector::config::Config;
use measure_detector::dataset::{MeasureDataset, yolo};
use measure_detector::detection::{
    CheckpointCache, Detection, DetectorOptions, Device, checkpoint_file_name,
};
use measure_detector::{AppState, app};

#[derive(Parser)]
#[command(about = "Detect measures in sheet-music scans")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve POST /process-image
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Checkpoint to serve
        #[arg(long)]
        model: Option<PathBuf>,
        /// cpu, cuda or cuda:<id>
        #[arg(long)]
        device: Option<Device>,
    },
    /// Run a checkpoint on one image and print the measures as JSON
    Detect {
        image: PathBuf,
        /// Epoch count of the checkpoint (model.RCNN.<epochs>.onnx)
        #[arg(long, default_value_t = 2)]
        epochs: u32,
        /// Explicit checkpoint path, overrides --epochs
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        device: Option<Device>,
        /// Write the padded page with measure outlines to this PNG
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Load every annotated page and report counts
    InspectDataset { root: PathBuf },
    /// Write YOLO label files for every annotated page
    YoloLabels { root: PathBuf, out: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenvy::dotenv().ok();
    let mut config = Config::from_env();

    match Cli::parse().command {
        None => serve(config).await,
        Some(Command::Serve {
            host,
            port,
            model,
            device,
        }) => {
            config.host = host.unwrap_or(config.host);
            config.port = port.unwrap_or(config.port);
            config.model_path = model.unwrap_or(config.model_path);
            config.device = device.unwrap_or(config.device);
            serve(config).await
        }
        Some(Command::Detect {
            image,
            epochs,
            model,
            device,
            overlay,
        }) => {
            let model = model.unwrap_or_else(|| PathBuf::from(checkpoint_file_name(epochs)));
            config.device = device.unwrap_or(config.device);
            tokio::task::spawn_blocking(move || detect(&config, &model, &image, overlay)).await?
        }
        Some(Command::InspectDataset { root }) => {
            tokio::task::spawn_blocking(move || inspect_dataset(&config, &root)).await?
        }
        Some(Command::YoloLabels { root, out }) => {
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let dataset = MeasureDataset::open(&root, 0)?;
                let written = yolo::export_labels(&dataset, &out)?;
                println!("wrote {} label files to {}", written.len(), out.display());
                Ok(())
            })
            .await?
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config);

    if state.config.preload_model {
        let detectors = state.detectors.clone();
        let model = state.config.model_path.clone();
        let loaded = tokio::task::spawn_blocking(move || detectors.get_or_load(&model)).await?;
        if let Err(e) = loaded {
            tracing::warn!("Failed to preload detector, will retry on first request: {e}");
        }
    }

    tracing::info!(device = %state.config.device, model = %state.config.model_path.display(), "listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn detect(
    config: &Config,
    model: &Path,
    image_path: &Path,
    overlay: Option<PathBuf>,
) -> anyhow::Result<()> {
    let options = DetectorOptions::new()
        .with_device(config.device)
        .with_intra_threads(config.intra_threads);
    let cache = CheckpointCache::new(options, config.confidence_threshold);
    let engine = cache.get_or_load(model)?;

    let image = image::open(image_path)
        .with_context(|| format!("failed to open {}", image_path.display()))?;
    let detections = engine.detect(&image)?;
    println!("{}", serde_json::to_string_pretty(&detections)?);

    if let Some(path) = overlay {
        draw_overlay(&image, &detections)
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("overlay written to {}", path.display());
    }
    Ok(())
}

fn draw_overlay(image: &image::DynamicImage, detections: &[Detection]) -> image::RgbImage {
    let gray = image.to_luma8();
    let side = measure_detector::detection::CANVAS_SIZE;
    let mut canvas = image::RgbImage::new(side, side);
    for (x, y, pixel) in gray.enumerate_pixels() {
        if x < side && y < side {
            let v = pixel.0[0];
            canvas.put_pixel(x, y, Rgb([v, v, v]));
        }
    }

    let red = Rgb([255, 0, 0]);
    for d in detections {
        let (w, h) = (d.width.round() as u32, d.height.round() as u32);
        if w == 0 || h == 0 {
            continue;
        }
        let rect = Rect::at(d.x.round() as i32, d.y.round() as i32).of_size(w, h);
        draw_hollow_rect_mut(&mut canvas, rect, red);
    }
    canvas
}

fn inspect_dataset(config: &Config, root: &Path) -> anyhow::Result<()> {
    let dataset = MeasureDataset::open(root, config.dataset_cache_capacity)?;
    let mut measures = 0usize;
    let mut failed = 0usize;
    for idx in 0..dataset.len() {
        match dataset.sample(idx) {
            Ok(sample) => measures += sample.target.len(),
            Err(e) => {
                failed += 1;
                tracing::warn!("{}: {e}", dataset.entries()[idx].image_path.display());
            }
        }
    }
    println!(
        "{} pages, {} measures, {} unreadable",
        dataset.len(),
        measures,
        failed
    );
    Ok(())
}
