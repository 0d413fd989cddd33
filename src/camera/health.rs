use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::HealthConfig;

/// Circuit-breaker state for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Healthy,
    /// Tripped; processing is skipped until the cooldown elapses.
    Open,
    /// Cooldown elapsed; the owning worker should attempt reconnection.
    RetryReady,
}

/// What the worker should do with its camera this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Process,
    Skip,
    Reconnect,
}

#[derive(Debug)]
struct CameraHealth {
    errors: u32,
    last_error: Option<String>,
    last_error_at: Option<Instant>,
    state: BreakerState,
    opened_at: Option<Instant>,
}

impl CameraHealth {
    fn new() -> Self {
        Self {
            errors: 0,
            last_error: None,
            last_error_at: None,
            state: BreakerState::Healthy,
            opened_at: None,
        }
    }
}

/// Failure-count circuit breaker over all registered cameras. Workers feed
/// it capture outcomes and consult the gate; the periodic sweep promotes
/// cooled-down breakers to retry-ready without ever touching capture
/// handles itself.
pub struct HealthMonitor {
    cameras: RwLock<HashMap<String, CameraHealth>>,
    error_threshold: u32,
    cooldown: Duration,
    max_retry_attempts: u32,
    retry_cooldown: Duration,
}

impl HealthMonitor {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            cameras: RwLock::new(HashMap::new()),
            error_threshold: config.error_threshold,
            cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            max_retry_attempts: config.max_retry_attempts,
            retry_cooldown: Duration::from_secs(config.retry_cooldown_secs),
        }
    }

    pub fn register(&self, url: &str) {
        self.cameras
            .write()
            .unwrap()
            .insert(url.to_string(), CameraHealth::new());
    }

    pub fn deregister(&self, url: &str) {
        self.cameras.write().unwrap().remove(url);
    }

    pub fn record_failure(&self, url: &str, message: &str) {
        let mut cameras = self.cameras.write().unwrap();
        let Some(health) = cameras.get_mut(url) else {
            return;
        };
        health.errors += 1;
        health.last_error = Some(message.to_string());
        health.last_error_at = Some(Instant::now());

        if health.errors >= self.error_threshold && health.state == BreakerState::Healthy {
            health.state = BreakerState::Open;
            health.opened_at = Some(Instant::now());
            tracing::warn!(
                url = %url,
                errors = health.errors,
                error = %message,
                "circuit breaker opened"
            );
        }
    }

    /// Successful capture or reconnect: counter back to zero, breaker closed.
    pub fn record_success(&self, url: &str) {
        let mut cameras = self.cameras.write().unwrap();
        let Some(health) = cameras.get_mut(url) else {
            return;
        };
        if health.state != BreakerState::Healthy {
            tracing::info!(url = %url, "camera recovered");
        }
        health.errors = 0;
        health.state = BreakerState::Healthy;
        health.opened_at = None;
    }

    /// Reconnect attempts exhausted; stay open and restart the cooldown so
    /// the next sweep retries again.
    pub fn reconnect_failed(&self, url: &str) {
        let mut cameras = self.cameras.write().unwrap();
        if let Some(health) = cameras.get_mut(url) {
            health.state = BreakerState::Open;
            health.opened_at = Some(Instant::now());
        }
    }

    pub fn gate(&self, url: &str) -> Gate {
        let cameras = self.cameras.read().unwrap();
        match cameras.get(url).map(|h| h.state) {
            Some(BreakerState::Healthy) | None => Gate::Process,
            Some(BreakerState::Open) => Gate::Skip,
            Some(BreakerState::RetryReady) => Gate::Reconnect,
        }
    }

    pub fn state(&self, url: &str) -> Option<BreakerState> {
        self.cameras.read().unwrap().get(url).map(|h| h.state)
    }

    pub fn error_count(&self, url: &str) -> u32 {
        self.cameras
            .read()
            .unwrap()
            .get(url)
            .map(|h| h.errors)
            .unwrap_or(0)
    }

    /// Most recent error and when it was recorded.
    pub fn last_error(&self, url: &str) -> Option<(String, Instant)> {
        let cameras = self.cameras.read().unwrap();
        let health = cameras.get(url)?;
        Some((health.last_error.clone()?, health.last_error_at?))
    }

    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    pub fn retry_cooldown(&self) -> Duration {
        self.retry_cooldown
    }

    /// One monitoring pass: open breakers whose cooldown elapsed become
    /// retry-ready.
    pub fn sweep(&self) {
        let mut cameras = self.cameras.write().unwrap();
        for (url, health) in cameras.iter_mut() {
            if health.state == BreakerState::Open {
                let elapsed = health.opened_at.map(|t| t.elapsed()).unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    health.state = BreakerState::RetryReady;
                    tracing::info!(url = %url, "cooldown elapsed, camera eligible for reconnect");
                }
            }
        }
    }
}

/// Periodic health sweep, independent of the processing loops.
pub fn spawn_sweep(monitor: Arc<HealthMonitor>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            monitor.sweep();
        }
    })
}
