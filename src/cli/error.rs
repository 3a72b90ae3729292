use difftrace_assets::{AssetError, ConfigError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// A flag or environment value the asset layer would reject.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("no {kind} attention for layer '{layer}' at step {step}")]
    MissingAttention { kind: &'static str, layer: String, step: u32 },

    /// Errors, or warnings under `--strict`.
    #[error("validation failed with {errors} error(s) and {warnings} warning(s)")]
    ValidationFailed { errors: usize, warnings: usize },
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}
