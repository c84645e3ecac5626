//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{HostConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HostConfig) -> ConfigResult<()> {
    validate_plugin_lists(config)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_plugin_lists(config: &HostConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for id in &config.plugins {
        if id.trim().is_empty() {
            return Err(ConfigError::validation("Plugin ids in `plugins` must not be empty"));
        }
        if !seen.insert(id.as_str()) {
            return Err(ConfigError::validation(format!(
                "Plugin '{id}' is listed more than once in `plugins`"
            )));
        }
    }

    if config.disable_plugins.iter().any(|id| id.trim().is_empty()) {
        return Err(ConfigError::validation(
            "Plugin ids in `disable_plugins` must not be empty",
        ));
    }

    for (id, section) in &config.plugin_config {
        if !section.is_object() {
            return Err(ConfigError::validation(format!(
                "Config section for plugin '{id}' must be a table"
            )));
        }
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is `file`",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&HostConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let config = HostConfig {
            plugins: vec!["dice".into(), "dice".into()],
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("dice"));
    }

    #[test]
    fn test_non_object_section_rejected() {
        let mut config = HostConfig::default();
        config.plugin_config.insert("dice".into(), json!(3));
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = HostConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("weft.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
