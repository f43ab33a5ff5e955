//! Runtime error types.

use parley_framework::BotError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up a bot from configuration.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The bot rejected its setup or a request.
    #[error(transparent)]
    Bot(#[from] BotError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
