// Configuration loader
// Loads settings from ~/.wheelhouse/config.toml, falling back to defaults.

use std::path::Path;

use crate::error::{AgentError, Result};

use super::settings::Config;

/// Load configuration from the default location.
///
/// A missing file is not an error; every field has a default so the control
/// plane works out of the box against a worker on 127.0.0.1:4823.
pub fn load_config() -> Result<Config> {
    let Some(home) = dirs::home_dir() else {
        return Ok(Config::default());
    };
    let path = home.join(".wheelhouse/config.toml");
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let mut config: Config = toml::from_str(&contents)
        .map_err(|e| AgentError::Config(format!("failed to parse {}: {}", path.display(), e)))?;

    // Environment overrides, mirroring the variables handed to the worker.
    if let Ok(host) = std::env::var("AGENT_HOST") {
        if !host.is_empty() {
            config.worker.host = host;
        }
    }
    if let Ok(port) = std::env::var("AGENT_PORT") {
        if let Ok(port) = port.parse() {
            config.worker.port = port;
        }
    }

    Ok(config)
}
