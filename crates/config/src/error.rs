use thiserror::Error;

/// Errors that can occur while assembling [`crate::Config`] from the process
/// environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `PORT` was set but could not be parsed as a `u16`.
    #[error("invalid PORT value '{0}': must be a number between 0 and 65535")]
    InvalidPort(String),

    /// `MODELS` was set but expanded to an empty list after trimming.
    #[error("MODELS must contain at least one non-empty, comma-separated model id")]
    EmptyModelList,
}
