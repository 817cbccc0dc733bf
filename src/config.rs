//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub canvas: CanvasConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Upper bound on submission bodies (image data URLs are large)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024 // 16 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Collaboration hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Maximum number of concurrently connected clients
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Droppable (drawing) events buffered per subscriber before the oldest is dropped
    #[serde(default = "default_droppable_queue_size")]
    pub droppable_queue_size: usize,

    /// Undelivered critical events tolerated per subscriber before it is disconnected
    #[serde(default = "default_critical_queue_size")]
    pub critical_queue_size: usize,

    /// Replay the current canvas to every client as it joins
    #[serde(default)]
    pub replay_on_join: bool,

    /// Broadcast `clear` to every client instead of clearing only the sender's strokes
    #[serde(default = "default_broadcast_clear")]
    pub broadcast_clear: bool,
}

fn default_max_clients() -> usize {
    256
}

fn default_droppable_queue_size() -> usize {
    512
}

fn default_critical_queue_size() -> usize {
    4096
}

fn default_broadcast_clear() -> bool {
    true
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_clients: default_max_clients(),
            droppable_queue_size: default_droppable_queue_size(),
            critical_queue_size: default_critical_queue_size(),
            replay_on_join: false,
            broadcast_clear: default_broadcast_clear(),
        }
    }
}

/// Canvas bounding box; incoming points are clamped into it
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: f64,

    #[serde(default = "default_canvas_height")]
    pub height: f64,
}

fn default_canvas_width() -> f64 {
    800.0
}

fn default_canvas_height() -> f64 {
    600.0
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
        }
    }
}

/// External classifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Classifier endpoint. When absent the built-in mock classifier is used.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Deadline for a single classification
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Prompt forwarded to the classifier
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Simulated latency of the mock classifier
    #[serde(default = "default_mock_delay")]
    pub mock_delay_ms: u64,

    /// Finished requests kept around for status lookups
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

fn default_classifier_timeout() -> u64 {
    30
}

fn default_prompt() -> String {
    "What is in this image?".to_string()
}

fn default_mock_delay() -> u64 {
    2000
}

fn default_retain_finished() -> usize {
    256
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_classifier_timeout(),
            prompt: default_prompt(),
            mock_delay_ms: default_mock_delay(),
            retain_finished: default_retain_finished(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("sketchroom").join("config.toml")),
            Some(PathBuf::from("/etc/sketchroom/config.toml")),
            Some(PathBuf::from("./sketchroom.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(host) = std::env::var("SKETCHROOM_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("SKETCHROOM_PORT") {
            self.server.port = port;
        }

        // Hub overrides
        if let Some(max) = env_parse("SKETCHROOM_MAX_CLIENTS") {
            self.hub.max_clients = max;
        }

        // Classifier overrides
        if let Ok(url) = std::env::var("SKETCHROOM_CLASSIFIER_URL") {
            self.classifier.endpoint = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(secs) = env_parse("SKETCHROOM_CLASSIFIER_TIMEOUT_SECS") {
            self.classifier.timeout_secs = secs;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("SKETCHROOM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SKETCHROOM_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sketchroom Configuration
#
# Environment variables override these settings:
# - SKETCHROOM_HOST
# - SKETCHROOM_PORT
# - SKETCHROOM_MAX_CLIENTS
# - SKETCHROOM_CLASSIFIER_URL
# - SKETCHROOM_CLASSIFIER_TIMEOUT_SECS
# - SKETCHROOM_LOG_LEVEL
# - SKETCHROOM_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8000

# Allowed CORS origins
cors_origins = ["http://localhost", "http://localhost:3000", "http://127.0.0.1:3000"]

# Maximum size of an analysis submission (bytes)
max_body_bytes = 16777216

[hub]
# Connections beyond this are rejected at upgrade time
max_clients = 256

# Drawing events buffered per client before the oldest is dropped
droppable_queue_size = 512

# Undelivered analysis results / control events before a client is disconnected
critical_queue_size = 4096

# Send the current canvas to clients as they join
replay_on_join = false

# true: "clear" wipes the shared canvas for everyone
# false: "clear" only discards the sender's own strokes
broadcast_clear = true

[canvas]
width = 800.0
height = 600.0

[classifier]
# Leave unset to use the built-in mock classifier
# endpoint = "http://localhost:9000/classify"

# Deadline for a single analysis (seconds)
timeout_secs = 30

prompt = "What is in this image?"

# Latency of the mock classifier (ms)
mock_delay_ms = 2000

# Finished analyses kept for status lookups
retain_finished = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
