//! Bootstrap configuration for ssedoc services
//!
//! Configuration is a single TOML file. Every field has a built-in default, so a
//! missing file (or a missing section) yields a fully usable config.
//!
//! # Resolution order
//!
//! 1. Explicit path (command-line `--config` or `SSEDOC_CONFIG`)
//! 2. `~/.config/ssedoc/config.toml`
//! 3. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Longest accepted `upload.timeout_secs` (one day)
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Upload session settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upload session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadConfig {
    /// Session deadline in seconds, shared by the upload session and the SSE stream
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of files accepted per session
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum request body size for `POST /upload`
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Forward every state transition; when false only milestone events are streamed
    #[serde(default = "default_stream_progress")]
    pub stream_progress: bool,

    /// Records kept by the delimited-text preview extractor
    #[serde(default = "default_csv_preview_rows")]
    pub csv_preview_rows: usize,

    /// How long `GET /sse` waits for an upload session to appear
    #[serde(default = "default_sse_attach_grace_ms")]
    pub sse_attach_grace_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9001
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_files() -> usize {
    10
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_stream_progress() -> bool {
    true
}

fn default_csv_preview_rows() -> usize {
    10
}

fn default_sse_attach_grace_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_files: default_max_files(),
            max_body_bytes: default_max_body_bytes(),
            stream_progress: default_stream_progress(),
            csv_preview_rows: default_csv_preview_rows(),
            sse_attach_grace_ms: default_sse_attach_grace_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn attach_grace(&self) -> Duration {
        Duration::from_millis(self.sse_attach_grace_ms)
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration
    ///
    /// An explicit path must exist. Without one, the per-user config file is used
    /// if present, otherwise built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading configuration from {}", path.display());
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.upload.timeout_secs == 0 {
            return Err(Error::Config("upload.timeout_secs must be greater than 0".to_string()));
        }
        if self.upload.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "upload.timeout_secs must be at most {}",
                MAX_TIMEOUT_SECS
            )));
        }
        if self.upload.max_files == 0 {
            return Err(Error::Config("upload.max_files must be greater than 0".to_string()));
        }
        if self.upload.csv_preview_rows == 0 {
            warn!("upload.csv_preview_rows is 0; delimited previews will always be empty");
        }
        Ok(())
    }
}

/// Per-user configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ssedoc").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.upload.max_files, 10);
        assert_eq!(config.upload.timeout(), Duration::from_secs(30));
        assert!(config.upload.stream_progress);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [upload]
            timeout_secs = 5
            stream_progress = false
            "#,
        )
        .unwrap();

        assert_eq!(config.upload.timeout_secs, 5);
        assert!(!config.upload.stream_progress);
        assert_eq!(config.upload.max_files, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = TomlConfig::from_toml_str("[upload]\ntimeout_secs = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let result = TomlConfig::from_toml_str("[upload]\ntimeout_secs = 9223372036854775807\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let config = TomlConfig::from_toml_str("[upload]\ntimeout_secs = 86400\n").unwrap();
        assert_eq!(config.upload.timeout_secs, MAX_TIMEOUT_SECS);
    }

    #[test]
    fn test_zero_max_files_rejected() {
        let result = TomlConfig::from_toml_str("[upload]\nmax_files = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("[upload\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
