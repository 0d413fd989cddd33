use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "HELMWATCH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_http_port() -> u16 {
    8080
}

fn default_stream_path() -> String {
    "/stream/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Public path prefix returned to clients when a camera is registered.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            stream_path: default_stream_path(),
        }
    }
}

fn default_processing_interval_ms() -> u64 {
    1_000
}

fn default_capture_timeout_ms() -> u64 {
    5_000
}

fn default_max_concurrent_processing() -> usize {
    10
}

fn default_max_concurrent_ai_tasks() -> usize {
    4
}

fn default_jpeg_quality() -> i32 {
    80
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_processing_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_processing")]
    pub max_concurrent_processing: usize,
    #[serde(default = "default_max_concurrent_ai_tasks")]
    pub max_concurrent_ai_tasks: usize,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_processing_interval_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
            max_concurrent_processing: default_max_concurrent_processing(),
            max_concurrent_ai_tasks: default_max_concurrent_ai_tasks(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_error_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_secs() -> u64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_cooldown_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_cooldown_secs")]
    pub retry_cooldown_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            error_threshold: default_error_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_cooldown_secs: default_retry_cooldown_secs(),
        }
    }
}

fn default_plate() -> f32 {
    0.60
}

fn default_plate_certain() -> f32 {
    0.90
}

fn default_no_helmet_certain() -> f32 {
    0.85
}

/// Confidence gates for attaching and promoting plate readings.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_plate")]
    pub plate: f32,
    #[serde(default = "default_plate_certain")]
    pub plate_certain: f32,
    #[serde(default = "default_no_helmet_certain")]
    pub no_helmet_certain: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            plate: default_plate(),
            plate_certain: default_plate_certain(),
            no_helmet_certain: default_no_helmet_certain(),
        }
    }
}

fn default_detect_confidence() -> f32 {
    0.25
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path or URL of the detection model; empty disables the bundled backend.
    #[serde(default)]
    pub detect_model: String,
    #[serde(default = "default_detect_confidence")]
    pub detect_confidence: f32,
    /// HTTP endpoint of the plate OCR service; empty disables recognition.
    #[serde(default)]
    pub ocr_endpoint: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detect_model: String::new(),
            detect_confidence: default_detect_confidence(),
            ocr_endpoint: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// Endpoint receiving violation batches; empty disables reporting.
    #[serde(default)]
    pub violation_endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
