use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::data::loader::DataLoader;
use crate::render::pipeline::RenderOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            _ => Err(ConfigError::InvalidMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub public_dir: PathBuf,
    /// Sent with client bundles in production mode.
    pub cache_control: String,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self { public_dir: PathBuf::from("public"), cache_control: "public, max-age=3600".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub buffer_size: usize,
    pub abort_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { buffer_size: 64, abort_timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub fetch_delay_ms: u64,
    /// Serve ambient-cache routes from one cache shared by every request.
    pub share_process_cache: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { fetch_delay_ms: 2000, share_process_cache: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub server: ServerConfig,
    pub static_files: StaticConfig,
    pub streaming: StreamingConfig,
    pub data: DataConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from `SUSPENSE_*` variables resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup("SUSPENSE_MODE") {
            config.mode = mode.parse()?;
        }

        if let Some(host) = lookup("SUSPENSE_HOST") {
            config.server.host = host;
        }

        if let Some(port) = lookup("SUSPENSE_PORT") {
            config.server.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }

        if let Some(public_dir) = lookup("SUSPENSE_PUBLIC_DIR") {
            config.static_files.public_dir = PathBuf::from(public_dir);
        }

        if let Some(cache_control) = lookup("SUSPENSE_STATIC_CACHE_CONTROL") {
            config.static_files.cache_control = cache_control;
        }

        if let Some(buffer_size) = lookup("SUSPENSE_STREAMING_BUFFER_SIZE") {
            config.streaming.buffer_size = buffer_size.parse().map_err(|_| {
                ConfigError::InvalidConfig("SUSPENSE_STREAMING_BUFFER_SIZE".to_string())
            })?;
        }

        if let Some(abort_timeout) = lookup("SUSPENSE_ABORT_TIMEOUT_MS") {
            config.streaming.abort_timeout_ms = abort_timeout
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(abort_timeout))?;
        }

        if let Some(fetch_delay) = lookup("SUSPENSE_FETCH_DELAY_MS") {
            config.data.fetch_delay_ms = fetch_delay
                .parse()
                .map_err(|_| ConfigError::InvalidConfig("SUSPENSE_FETCH_DELAY_MS".to_string()))?;
        }

        if let Some(share) = lookup("SUSPENSE_SHARE_PROCESS_CACHE") {
            config.data.share_process_cache = share.eq_ignore_ascii_case("true")
                || share == "1"
                || share.eq_ignore_ascii_case("yes");
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::FileRead)?;

        toml::from_str(&contents).map_err(ConfigError::TomlParse)
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::TomlSerialize)?;

        std::fs::write(path, contents).map_err(ConfigError::FileWrite)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort("0".to_string()));
        }

        if self.server.host.is_empty() {
            return Err(ConfigError::InvalidConfig("server.host cannot be empty".to_string()));
        }

        if self.streaming.abort_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("streaming.abort_timeout_ms".to_string()));
        }

        if self.streaming.buffer_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "streaming.buffer_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn public_dir(&self) -> &PathBuf {
        &self.static_files.public_dir
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            abort_after: Duration::from_millis(self.streaming.abort_timeout_ms),
            buffer_size: self.streaming.buffer_size,
        }
    }

    pub fn data_loader(&self) -> DataLoader {
        DataLoader::new(Duration::from_millis(self.data.fetch_delay_ms))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid config value for {0}")]
    InvalidConfig(String),

    #[error("Failed to read config file: {0}")]
    FileRead(std::io::Error),

    #[error("Failed to write config file: {0}")]
    FileWrite(std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(toml::ser::Error),
}
