//! Platform-specific config directory helper.
//!
//! Uses the `dirs` crate to resolve the platform-appropriate directory:
//! - Linux:   `~/.config/flowcap/`
//! - Windows: `%APPDATA%\flowcap\`
//! - macOS:   `~/Library/Application Support/flowcap/`
//!
//! `FLOWCAP_CONFIG_DIR` overrides the location.

use std::path::PathBuf;

use crate::error::FlowError;

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "FLOWCAP_CONFIG_DIR";

/// Get the flowcap config directory. Does not create it.
pub fn flowcap_config_dir() -> Result<PathBuf, FlowError> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::config_dir()
        .ok_or_else(|| FlowError::Config("Could not determine config directory".into()))?;
    Ok(base.join("flowcap"))
}
