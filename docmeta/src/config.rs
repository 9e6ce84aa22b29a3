//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `DOCMETA_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `DOCMETA_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `DOCMETA_STORAGE__UPLOAD_DIR=/srv/uploads` sets the `storage.upload_dir` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use docmeta::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! DOCMETA_PORT=9000
//! DOCMETA_STORAGE__ATOMIC_WRITES=false
//! DOCMETA_LOGGING__LOG_DIR=/var/log/docmeta
//! DOCMETA_LIMITS__MAX_UPLOAD_BYTES=1048576
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DOCMETA_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults matching a bare `./uploads` + `./logs` deployment on port 8080.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to ("0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where and how uploaded documents are written
    pub storage: StorageConfig,
    /// Log file location and console output
    pub logging: LoggingConfig,
    /// Request size limits
    pub limits: LimitsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory uploaded documents are stored in, created at startup
    pub upload_dir: PathBuf,
    /// Stage each upload in a temporary file and rename it into place when complete.
    ///
    /// With this off, the target file is truncated and written directly, so concurrent uploads
    /// of the same name may interleave.
    pub atomic_writes: bool,
    /// How client-supplied filenames are turned into storage paths
    pub filename_policy: FilenamePolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            atomic_writes: true,
            filename_policy: FilenamePolicy::default(),
        }
    }
}

/// Treatment of the client-supplied filename when building the storage path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenamePolicy {
    /// Reject names containing path separators, NUL bytes, `.`/`..` or absolute paths.
    #[default]
    Strict,
    /// Join the name to the upload directory exactly as received. Path traversal is possible.
    Verbatim,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Directory holding the service log file, created at startup
    pub log_dir: PathBuf,
    /// Name of the append-only log file inside `log_dir`
    pub file_name: String,
    /// Also write log lines to stdout
    pub console: bool,
    /// Filter directive (e.g. "info", "docmeta=debug"). Falls back to `RUST_LOG`, then "info".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            file_name: "document-service.log".to_string(),
            console: true,
            level: None,
        }
    }
}

impl LoggingConfig {
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted file payload in bytes
    pub max_upload_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.upload_dir cannot be empty".to_string(),
            });
        }

        if self.logging.log_dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: logging.log_dir cannot be empty".to_string(),
            });
        }

        if self.logging.file_name.is_empty() || self.logging.file_name.contains(['/', '\\']) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: logging.file_name ({:?}) must be a plain, non-empty file name",
                    self.logging.file_name
                ),
            });
        }

        if self.limits.max_upload_bytes == 0 {
            return Err(Error::Internal {
                operation: "Config validation: limits.max_upload_bytes must be positive".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values. DOCMETA_CONFIG names the file itself.
            .merge(Env::prefixed("DOCMETA_").split("__").ignore(&["config"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
