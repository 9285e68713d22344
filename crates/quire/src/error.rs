//! CLI error types.

use quire_config::ConfigError;
use quire_store::ProviderError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown backend '{name}' (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("{0}")]
    Validation(String),
}
