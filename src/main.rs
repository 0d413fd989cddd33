use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

mod api;
mod camera;
mod config;
mod pipeline;
mod results;

use camera::{HealthMonitor, StreamRegistry, WorkerContext};
use config::Config;
use pipeline::backends::{Backends, PlateRecognizer, Tracker};
use pipeline::{DisabledOcr, InferencePipeline, IouTracker, OnnxDetector, RemoteOcr};
use results::{ResultCache, ViolationReporter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("helmwatch=debug".parse()?))
        .init();

    let config = Config::load()?;

    if config.models.detect_model.is_empty() {
        return Err("no detection model configured ([models] detect_model)".into());
    }
    let detector = Arc::new(OnnxDetector::new(
        &config.models.detect_model,
        config.models.detect_confidence,
    )?);

    let recognizer: Arc<dyn PlateRecognizer> = if config.models.ocr_endpoint.is_empty() {
        tracing::warn!("no OCR endpoint configured, plate recognition disabled");
        Arc::new(DisabledOcr)
    } else {
        Arc::new(RemoteOcr::new(config.models.ocr_endpoint.clone()))
    };

    let pipeline = Arc::new(InferencePipeline::new(
        Backends {
            detector,
            recognizer,
            tracker_factory: Box::new(|| Box::new(IouTracker::new()) as Box<dyn Tracker>),
        },
        config.processing.max_concurrent_ai_tasks,
        config.thresholds.clone(),
        config.processing.jpeg_quality,
    ));

    let cache = Arc::new(ResultCache::new());
    let monitor = Arc::new(HealthMonitor::new(&config.health));
    let reporter = Arc::new(ViolationReporter::new(
        (!config.backend.violation_endpoint.is_empty())
            .then(|| config.backend.violation_endpoint.clone()),
    ));

    let ctx = Arc::new(WorkerContext {
        processing: config.processing.clone(),
        cache: Arc::clone(&cache),
        monitor: Arc::clone(&monitor),
        pipeline,
        reporter,
        capture_permits: Arc::new(Semaphore::new(config.processing.max_concurrent_processing)),
    });

    let registry = Arc::new(StreamRegistry::new(ctx, config.http.stream_path.clone()));

    let sweep_handle = camera::spawn_sweep(
        Arc::clone(&monitor),
        Duration::from_secs(config.health.check_interval_secs),
    );

    let state = api::AppState {
        registry: Arc::clone(&registry),
        cache,
    };

    tokio::select! {
        result = api::start_server(state, config.http.port) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    sweep_handle.abort();
    registry.shutdown();
    tracing::info!("shutdown complete");

    Ok(())
}
