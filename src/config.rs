use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::error::{BridgeError, BridgeResult};
use crate::pose_detection::DEFAULT_CONFIDENCE_THRESHOLD;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "POSE_BRIDGE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// actix-web worker threads
    pub workers: usize,
    /// Largest accepted websocket frame, in bytes.
    pub max_frame_bytes: usize,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub intra_threads: i16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            // base64 640x480 JPEGs are ~100 KiB, the actix default of 64 KiB is too small
            max_frame_bytes: 4 * 1024 * 1024,
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/movenet_singlepose_lightning.onnx"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            intra_threads: 4,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file named by `POSE_BRIDGE_CONFIG`, then environment overrides.
    pub fn load() -> BridgeResult<Config> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Config::from_file(path)?,
            Err(_) => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> BridgeResult<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Config::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> BridgeResult<Config> {
        toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> BridgeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", &port)?;
        }
        if let Some(workers) = lookup("WORKERS") {
            self.workers = parse_var("WORKERS", &workers)?;
        }
        if let Some(bytes) = lookup("MAX_FRAME_BYTES") {
            self.max_frame_bytes = parse_var("MAX_FRAME_BYTES", &bytes)?;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.model_path = PathBuf::from(path);
        }
        if let Some(threshold) = lookup("CONFIDENCE_THRESHOLD") {
            self.model.confidence_threshold = parse_var("CONFIDENCE_THRESHOLD", &threshold)?;
        }
        if let Some(threads) = lookup("INTRA_THREADS") {
            self.model.intra_threads = parse_var("INTRA_THREADS", &threads)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> BridgeResult<()> {
        let threshold = self.model.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(BridgeError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.workers == 0 {
            return Err(BridgeError::Config("workers must be at least 1".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(BridgeError::Config("max_frame_bytes must be positive".into()));
        }
        if self.model.intra_threads < 1 {
            return Err(BridgeError::Config("intra_threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> BridgeResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("{}: cannot parse '{}'", key, value)))
}
