//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use crate::error::AppError;
use crate::limiter::LimiterConfig;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote API configuration
    pub api: ApiConfig,
    /// Throughput configuration shared by every outbound call
    pub rate: RateConfig,
    /// Per-call execution configuration
    pub execution: ExecutionConfig,
    /// Input and output locations
    pub io: IoConfig,
    /// Variables that were set but could not be parsed; their defaults apply
    pub ignored: Vec<String>,
}

/// Remote API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the D&B Direct+ API
    pub dpl_base_url: String,
    /// Base URL of the GLEIF API
    pub gleif_base_url: String,
    /// JSON file holding the bearer token
    pub credentials_file: PathBuf,
}

/// Throughput configuration
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Maximum transactions per second
    pub max_tps: u32,
    /// Maximum burst size (bucket capacity)
    pub burst: u32,
}

/// Execution configuration
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Deadline for a single request once it has been admitted (in seconds)
    pub timeout_secs: u64,
    /// Log the HTTP status of every call
    pub log_status: bool,
}

/// Input/output configuration
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Directory the input files are read from
    pub input_dir: PathBuf,
    /// Directory the results are written to
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        let max_tps: u32 = parse_or("DPL_MAX_TPS", lookup("DPL_MAX_TPS"), 4, &mut ignored);
        let burst: u32 = parse_or("DPL_BURST", lookup("DPL_BURST"), 1, &mut ignored);
        let timeout_secs: u64 =
            parse_or("DPL_TIMEOUT_SECS", lookup("DPL_TIMEOUT_SECS"), 30, &mut ignored);

        Self {
            api: ApiConfig {
                dpl_base_url: lookup("DPL_API_URL")
                    .unwrap_or_else(|| "https://plus.dnb.com".to_string()),
                gleif_base_url: lookup("GLEIF_API_URL")
                    .unwrap_or_else(|| "https://api.gleif.org".to_string()),
                credentials_file: lookup("DPL_CREDENTIALS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("dnbDplCredentials.json")),
            },
            rate: RateConfig {
                max_tps,
                burst,
            },
            execution: ExecutionConfig {
                timeout_secs,
                log_status: lookup("DPL_LOG_STATUS")
                    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
            io: IoConfig {
                input_dir: lookup("DPL_INPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("in")),
                output_dir: lookup("DPL_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("out")),
            },
            ignored,
        }
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rate.max_tps == 0 {
            return Err(AppError::InvalidConfig("DPL_MAX_TPS must be > 0".into()));
        }
        if self.rate.burst == 0 {
            return Err(AppError::InvalidConfig("DPL_BURST must be > 0".into()));
        }
        if self.execution.timeout_secs == 0 {
            return Err(AppError::InvalidConfig(
                "DPL_TIMEOUT_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Limiter settings derived from the rate configuration
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig::new(self.rate.max_tps).with_capacity(self.rate.burst)
    }

    /// Per-call deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }
}

/// Parse a set variable, falling back to `default` (with a warning) when the
/// value does not parse
fn parse_or<T>(key: &str, value: Option<String>, default: T, ignored: &mut Vec<String>) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(variable = key, value = %raw, default = %default, "Invalid value, using default");
            ignored.push(key.to_string());
            default
        }
    }
}
