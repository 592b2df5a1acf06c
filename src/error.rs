use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("{operation} timed out after {}", humantime::format_duration(*after))]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Destination not writable: {}", path.display())]
    DestinationNotWritable { path: PathBuf },

    #[error("Connection failed to {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Stream is unusable after a previous failure")]
    StreamUnusable,

    #[error("Transfer aborted")]
    Aborted,
}

impl FlowError {
    /// True when a deadline fired, as opposed to the I/O itself failing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::Timeout { .. })
    }

    /// Returns a user-friendly suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            FlowError::Timeout { .. } => {
                Some("Raise the limit with --timeout, or check that the peer or storage is responsive.")
            }
            FlowError::Config(_) => {
                Some("Limits look like '100KiB/s', '10MB/s' or 'unlimited'; timeouts like '30s'.")
            }
            FlowError::SourceNotFound { .. } => {
                Some("Check the path exists and spelling is correct.")
            }
            FlowError::PermissionDenied { .. } => {
                Some("Try running with elevated privileges, or check file permissions.")
            }
            FlowError::DestinationNotWritable { .. } => {
                Some("Check that the destination directory exists and you have write permission.")
            }
            FlowError::ConnectionFailed { .. } => {
                Some("Check that the host is reachable and the port is correct.")
            }
            FlowError::StreamUnusable => Some("Close the connection and start a new transfer."),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(err: toml::de::Error) -> Self {
        FlowError::Config(format!("Invalid TOML: {}", err))
    }
}
