//! Configuration loading for the pager CLI.

use anyhow::{Context, Result};
use beep_pager_client::SessionConfig;
use std::path::{Path, PathBuf};

/// Default config file location (`<config dir>/pager.toml`).
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "beep", "pager")
        .context("Could not determine home directory")?;
    Ok(dirs.config_dir().join("pager.toml"))
}

/// Load the session configuration.
///
/// An explicitly given file must exist. The default file is optional;
/// defaults are used when it is absent. `endpoint` overrides the file.
pub fn load(explicit: Option<&Path>, endpoint: Option<&str>) -> Result<SessionConfig> {
    let mut config = match explicit {
        Some(path) => SessionConfig::from_file(path)?,
        None => {
            let path = default_config_path()?;
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                SessionConfig::from_file(&path)?
            } else {
                SessionConfig::default()
            }
        }
    };

    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }
    Ok(config)
}
