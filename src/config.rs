//! # Configuration Module
//!
//! Handles loading and validating the static server configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the
//! `default_*` functions below, so an empty file is a valid configuration.
//! Relative paths are resolved against the data directory given on the
//! command line.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ServerError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Host name or IP placed into the URLs handed to the device.
    /// Discovered from the outbound interface when unset.
    #[serde(default)]
    pub public_host: Option<String>,

    #[serde(default = "default_tls_enabled")]
    pub tls_enabled: bool,

    #[serde(default = "default_tls_cert")]
    pub tls_cert: PathBuf,

    #[serde(default = "default_tls_key")]
    pub tls_key: PathBuf,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Journal buffer and file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    #[serde(default = "default_server_log_file")]
    pub server_log_file: PathBuf,

    #[serde(default = "default_telemetry_file")]
    pub telemetry_file: PathBuf,

    #[serde(default = "default_device_log_file")]
    pub device_log_file: PathBuf,
}

/// Rendering and image source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_footer_font")]
    pub footer_font: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_firmware_path")]
    pub firmware_path: String,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_trace_file")]
    pub trace_file: bool,
}

// Default value functions
fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 1184 }
fn default_tls_enabled() -> bool { true }
fn default_tls_cert() -> PathBuf { PathBuf::from("ssl/cert.pem") }
fn default_tls_key() -> PathBuf { PathBuf::from("ssl/key.pem") }
fn default_shutdown_grace_secs() -> u64 { 5 }

fn default_buffer_capacity() -> usize { 30 }
fn default_write_retries() -> u32 { 3 }
fn default_log_tail_lines() -> usize { 20 }
fn default_server_log_file() -> PathBuf { PathBuf::from("logs/server.log") }
fn default_telemetry_file() -> PathBuf { PathBuf::from("db/clientData.txt") }
fn default_device_log_file() -> PathBuf { PathBuf::from("db/clientLog.txt") }

fn default_footer_font() -> String { "9x18_bold".to_string() }
fn default_fetch_timeout_secs() -> u64 { 10 }
fn default_firmware_path() -> String { "/fw/update".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_trace_file() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            public_host: None,
            tls_enabled: default_tls_enabled(),
            tls_cert: default_tls_cert(),
            tls_key: default_tls_key(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            write_retries: default_write_retries(),
            log_tail_lines: default_log_tail_lines(),
            server_log_file: default_server_log_file(),
            telemetry_file: default_telemetry_file(),
            device_log_file: default_device_log_file(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            footer_font: default_footer_font(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            firmware_path: default_firmware_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            trace_file: default_trace_file(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use epaper_server::config::Config;
    ///
    /// let config = Config::load("server.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(ServerError::Config("bind_address cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(ServerError::Config("port must be greater than 0".to_string()));
        }

        if self.server.shutdown_grace_secs > 300 {
            return Err(ServerError::Config(
                "shutdown_grace_secs must be between 0 and 300".to_string(),
            ));
        }

        if self.storage.buffer_capacity < 2 || self.storage.buffer_capacity > 10_000 {
            return Err(ServerError::Config(
                "buffer_capacity must be between 2 and 10000".to_string(),
            ));
        }

        if self.storage.write_retries > 10 {
            return Err(ServerError::Config("write_retries must be between 0 and 10".to_string()));
        }

        if self.storage.log_tail_lines == 0 {
            return Err(ServerError::Config("log_tail_lines must be greater than 0".to_string()));
        }

        for (name, path) in [
            ("server_log_file", &self.storage.server_log_file),
            ("telemetry_file", &self.storage.telemetry_file),
            ("device_log_file", &self.storage.device_log_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ServerError::Config(format!("{} cannot be empty", name)));
            }
        }

        if self.display.fetch_timeout_secs == 0 || self.display.fetch_timeout_secs > 120 {
            return Err(ServerError::Config(
                "fetch_timeout_secs must be between 1 and 120".to_string(),
            ));
        }

        if !self.display.firmware_path.starts_with('/') {
            return Err(ServerError::Config("firmware_path must start with '/'".to_string()));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(ServerError::Config(
                "log level must be one of: trace, debug, info, warn, error".to_string(),
            ));
        }

        Ok(())
    }

    /// URL scheme handed to the device
    pub fn scheme(&self) -> &'static str {
        if self.server.tls_enabled { "https" } else { "http" }
    }
}

/// Resolve a configured path against the data directory.
///
/// Absolute paths are returned unchanged.
pub fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}
