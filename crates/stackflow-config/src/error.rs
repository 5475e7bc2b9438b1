use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Operator config not found. Looked in:\n\
        - STACKFLOW_CONFIG environment variable\n\
        - current directory: stackflow.local.yaml, stackflow.yaml\n\
        - ~/.config/stackflow/operator.yaml"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
