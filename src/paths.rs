//! Centralized path resolution for dsync
//!
//! The config directory is resolved in this order:
//!
//! 1. `DSYNC_CONFIG_DIR` environment variable
//! 2. `$XDG_CONFIG_HOME/dsync`
//! 3. `~/.config/dsync`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable to override the config directory
pub const ENV_CONFIG_DIR: &str = "DSYNC_CONFIG_DIR";

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the dsync config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        let path = expand(&xdg).join("dsync");
        log::debug!("Using XDG config dir: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("dsync");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the path of the configuration file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
