//! Configuration validation utilities.

use brass_framework::EngineConfig;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BrassConfig, LogFormat, LogOutput, LoggingConfig, RuntimeConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BrassConfig) -> ConfigResult<()> {
    validate_engine_config(&config.engine)?;
    validate_logging_config(&config.logging)?;
    validate_runtime_config(&config.runtime)?;
    Ok(())
}

fn validate_engine_config(engine: &EngineConfig) -> ConfigResult<()> {
    if engine.command_start.is_empty() {
        return Err(ConfigError::validation(
            "engine.command_start must list at least one start string (use \"\" for none)",
        ));
    }

    if engine.command_sep.iter().any(String::is_empty) {
        return Err(ConfigError::validation(
            "engine.command_sep cannot contain an empty separator",
        ));
    }

    if engine.session_expire_secs == 0 {
        return Err(ConfigError::validation(
            "engine.session_expire_secs must be greater than 0",
        ));
    }

    if engine.handler_timeout_ms == Some(0) {
        return Err(ConfigError::validation(
            "engine.handler_timeout_ms must be greater than 0 when set",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "logging.format = \"json\" requires the json-log feature",
        ));
    }

    Ok(())
}

fn validate_runtime_config(runtime: &RuntimeConfig) -> ConfigResult<()> {
    if runtime.sweep_interval_secs == 0 {
        return Err(ConfigError::validation(
            "runtime.sweep_interval_secs must be greater than 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BrassConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_command_start_rejected() {
        let mut config = BrassConfig::default();
        config.engine.command_start.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let mut config = BrassConfig::default();
        config.engine.session_expire_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = BrassConfig::default();
        config.engine.handler_timeout_ms = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = BrassConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some("brass.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
