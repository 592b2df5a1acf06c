use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::transfer::deadline::Deadline;
use crate::transfer::throttle::RateLimit;

/// Default number of bytes requested per raw read.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Verbosity level controlling tracing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (info level)
    Normal,
    /// Verbose output (debug level)
    Verbose,
    /// Maximum output (trace level)
    Trace,
}

impl From<(bool, u8)> for Verbosity {
    /// Convert from (quiet_flag, verbose_count) to Verbosity.
    ///
    /// - quiet=true -> Quiet (regardless of verbose count)
    /// - verbose=0  -> Normal
    /// - verbose=1  -> Verbose
    /// - verbose=2+ -> Trace
    fn from((quiet, verbose_count): (bool, u8)) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            match verbose_count {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

impl Verbosity {
    /// Return the tracing filter string for this verbosity level.
    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

/// Rate limits, deadline and chunking for transfers.
///
/// Loaded from `config.toml`; every field is optional:
///
/// ```toml
/// read_speed_limit = "100KiB/s"
/// write_speed_limit = 204800
/// write_speed_limit_global = "1MiB/s"
/// timeout = "30s"
/// chunk_size = 8192
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Per-connection read ceiling.
    pub read_speed_limit: RateLimit,
    /// Per-connection write ceiling.
    pub write_speed_limit: RateLimit,
    /// Read ceiling shared by all connections of the process.
    pub read_speed_limit_global: RateLimit,
    /// Write ceiling shared by all connections of the process.
    pub write_speed_limit_global: RateLimit,
    /// Bound on each connect, read and write call.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Simulated storage speed; `unlimited` uses the plain local backend.
    pub storage_rate: RateLimit,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            read_speed_limit: RateLimit::Unlimited,
            write_speed_limit: RateLimit::Unlimited,
            read_speed_limit_global: RateLimit::Unlimited,
            write_speed_limit_global: RateLimit::Unlimited,
            timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            storage_rate: RateLimit::Unlimited,
        }
    }
}

impl ThrottleConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: ThrottleConfig = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, or defaults if it does not exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self, FlowError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values that cannot drive a transfer.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.chunk_size == 0 {
            return Err(FlowError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::new(self.timeout)
    }
}
