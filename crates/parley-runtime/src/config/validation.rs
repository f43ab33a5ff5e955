//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    if config.bot.resolve_concurrency == 0 {
        return Err(ConfigError::validation(
            "bot.resolve_concurrency must be greater than 0",
        ));
    }

    if config.session.capacity == 0 {
        return Err(ConfigError::validation(
            "session.capacity must be greater than 0",
        ));
    }

    if config.session.ttl_secs == 0 {
        return Err(ConfigError::validation(
            "session.ttl_secs must be greater than 0",
        ));
    }

    validate_logging_config(&config.logging)
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter targets cannot be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let mut config = ParleyConfig::default();
        config.bot.resolve_concurrency = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = ParleyConfig::default();
        config.session.capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ParleyConfig::default();
        config.session.ttl_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = ParleyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("parley.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
