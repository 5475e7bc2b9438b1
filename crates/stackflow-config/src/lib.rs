pub mod error;
pub mod model;

pub use error::*;
pub use model::*;

use std::path::{Path, PathBuf};

/// Environment variable pointing directly at the operator config
pub const CONFIG_ENV: &str = "STACKFLOW_CONFIG";

/// Per-user operator config (`~/.config/stackflow/operator.yaml`)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stackflow").join("operator.yaml"))
}

/// Find the operator config file.
///
/// Search order:
/// 1. `STACKFLOW_CONFIG` (direct path)
/// 2. current directory: stackflow.local.yaml, stackflow.yaml
/// 3. ~/.config/stackflow/operator.yaml
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    for filename in ["stackflow.local.yaml", "stackflow.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(global_config) = global_config_path().filter(|path| path.exists()) {
        return Ok(global_config);
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load and validate the config at `path`
pub fn load_config(path: &Path) -> Result<OperatorConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: OperatorConfig =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;

    tracing::debug!(
        installation = %config.installation_name,
        "loaded operator config from {}",
        path.display()
    );
    Ok(config)
}

/// Load the config at `path`, or discover one when no path is given
pub fn load(path: Option<&Path>) -> Result<OperatorConfig> {
    match path {
        Some(path) => load_config(path),
        None => load_config(&find_config_file()?),
    }
}
