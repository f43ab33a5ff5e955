//! Configuration module for the Parley runtime.
//!
//! Settings are layered with figment (defaults, files, environment) and
//! validated before use.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, Profile, load_config, load_config_from_file};
pub use schema::{
    BotSection, LogFormat, LogLevel, LogOutput, LoggingConfig, ParleyConfig, SessionSection,
    SpanEventConfig,
};
pub use validation::validate_config;
