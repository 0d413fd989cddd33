use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::time::MissedTickBehavior;

use crate::config::ProcessingConfig;
use crate::pipeline::InferencePipeline;
use crate::results::{ResultCache, ViolationReporter};

use super::capture::{self, FrameGrabber};
use super::health::{Gate, HealthMonitor};

/// Everything a stream worker needs besides its own camera identity.
pub struct WorkerContext {
    pub processing: ProcessingConfig,
    pub cache: Arc<ResultCache>,
    pub monitor: Arc<HealthMonitor>,
    pub pipeline: Arc<InferencePipeline>,
    pub reporter: Arc<ViolationReporter>,
    /// Shared capture permit pool so one stuck camera cannot serialize the
    /// others.
    pub capture_permits: Arc<Semaphore>,
}

/// Supervised per-camera acquisition/processing loop. Stops when the
/// registry flips the watch channel.
pub fn spawn(
    ctx: Arc<WorkerContext>,
    url: String,
    stream_id: String,
    stop: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(ctx, url, stream_id, stop).await;
    })
}

async fn run(ctx: Arc<WorkerContext>, url: String, stream_id: String, mut stop: watch::Receiver<bool>) {
    tracing::info!(camera = %stream_id, url = %url, "stream worker started");

    let mut grabber: Option<FrameGrabber> = None;
    let mut sequence: u64 = 0;
    let capture_timeout = Duration::from_millis(ctx.processing.capture_timeout_ms);

    let mut ticker = tokio::time::interval(Duration::from_millis(ctx.processing.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match ctx.monitor.gate(&url) {
            Gate::Skip => continue,
            Gate::Reconnect => {
                grabber = reconnect(&ctx, &url, &stream_id).await;
                if grabber.is_some() {
                    ctx.monitor.record_success(&url);
                } else {
                    ctx.monitor.reconnect_failed(&url);
                }
                continue;
            }
            Gate::Process => {}
        }

        if !grabber.as_ref().is_some_and(|g| g.is_open()) {
            grabber = capture::initialize(&url).await;
            if grabber.is_none() {
                ctx.monitor.record_failure(&url, "failed to open stream");
                continue;
            }
        }

        let Ok(permit) = ctx.capture_permits.acquire().await else {
            break;
        };
        let Some(active) = grabber.take() else {
            continue;
        };
        let (returned, read_result) = capture::capture_frame(active, capture_timeout).await;
        grabber = returned;
        drop(permit);

        let frame = match read_result {
            Ok(frame) => {
                ctx.monitor.record_success(&url);
                frame
            }
            Err(e) => {
                ctx.monitor.record_failure(&url, &e.to_string());
                tracing::warn!(camera = %stream_id, error = %e, "frame capture failed");
                continue;
            }
        };
        sequence += 1;
        tracing::trace!(camera = %stream_id, sequence, "frame captured");

        if let Some(jpeg) = capture::compress_jpeg(&frame, ctx.processing.jpeg_quality) {
            ctx.cache.store_raw_frame(&stream_id, jpeg);
        }

        match ctx.pipeline.process(frame, &stream_id).await {
            Ok(detection) => {
                let time = chrono::Utc::now().timestamp_millis() as f64 / 1_000.0;
                let results = detection.detected_result.clone();
                ctx.cache.publish(&stream_id, detection, time);
                ctx.reporter.report(&url, &results).await;
            }
            Err(e) => {
                tracing::error!(camera = %stream_id, error = %e, "frame processing failed");
            }
        }
    }

    tracing::info!(camera = %stream_id, "stream worker stopped");
}

/// Up to `max_retry_attempts` reopen attempts with a cooldown between them.
/// Runs on the worker so the capture handle never changes owners.
async fn reconnect(ctx: &WorkerContext, url: &str, stream_id: &str) -> Option<FrameGrabber> {
    let attempts = ctx.monitor.max_retry_attempts();
    for attempt in 1..=attempts {
        if let Some(grabber) = capture::initialize(url).await {
            tracing::info!(camera = %stream_id, attempt, "reconnected to camera");
            return Some(grabber);
        }
        tracing::warn!(
            camera = %stream_id,
            attempt,
            max_attempts = attempts,
            "reconnect attempt failed"
        );
        if attempt < attempts {
            tokio::time::sleep(ctx.monitor.retry_cooldown()).await;
        }
    }
    None
}
