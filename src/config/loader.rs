//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::PathgateConfig;
use super::validation::Validator;
use std::path::Path;
use tracing::debug;

/// Configuration loader with validation support.
///
/// The `[ip_restriction]` section is always checked for structural
/// problems; registered validators run after that.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<PathgateConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), "loading configuration");
        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load_str(&self, content: &str) -> ConfigResult<PathgateConfig> {
        let config: PathgateConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration against all registered validators.
    fn validate(&self, config: &PathgateConfig) -> ConfigResult<()> {
        config
            .ip_restriction
            .validate()
            .map_err(|message| ConfigError::InvalidValue {
                field: "ip_restriction".to_string(),
                message,
            })?;

        for validator in &self.validators {
            let result = validator.validate(config);
            if !result.is_valid() {
                let errors: Vec<String> = result
                    .errors_only()
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                return Err(ConfigError::ValidationError(errors.join("; ")));
            }
        }
        Ok(())
    }

    /// Load configuration or return default if file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<PathgateConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            debug!(path = %path.display(), "configuration file absent, using defaults");
            Ok(PathgateConfig::default())
        }
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save<P: AsRef<Path>>(&self, config: &PathgateConfig, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(config)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasicValidator, StaticRuleValidator};
    use tempfile::tempdir;

    #[test]
    fn test_load_from_string() {
        let loader = ConfigLoader::new();
        let config = loader
            .load_str(
                r#"
            [service]
            name = "test"
        "#,
            )
            .unwrap();
        assert_eq!(config.service.name, "test");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pathgate.toml");

        std::fs::write(
            &config_path,
            r#"
            [ip_restriction]
            allowed_addresses = ["203.0.113.5"]
            protected_path_patterns = ["^/admin"]
        "#,
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let config = loader.load(&config_path).unwrap();
        assert_eq!(config.ip_restriction.allowed_addresses, vec!["203.0.113.5"]);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loader = ConfigLoader::new();
        let result = loader.load("/nonexistent/path/pathgate.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new();
        let config = loader.load_or_default("/nonexistent/path").unwrap();
        assert_eq!(config.service.name, "pathgate");
    }

    #[test]
    fn test_structural_check_always_runs() {
        let loader = ConfigLoader::new();
        let result = loader.load_str("[ip_restriction.forbidden_response]\nstatus = 302");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validators_run() {
        let loader = ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .with_validator(StaticRuleValidator::new());
        let result = loader.load_str("[ip_restriction]\nallowed_addresses = [\"10.0.0.0/33\"]");
        match result {
            Err(ConfigError::ValidationError(message)) => {
                assert!(message.contains("ip_restriction.allowed_addresses"));
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("saved.toml");

        let mut config = PathgateConfig::default();
        config.service.name = "saved".to_string();
        config.ip_restriction.protected_path_patterns = vec!["^/admin".to_string()];

        let loader = ConfigLoader::new();
        loader.save(&config, &config_path).unwrap();

        let loaded = loader.load(&config_path).unwrap();
        assert_eq!(loaded.service.name, "saved");
        assert_eq!(loaded.ip_restriction.protected_path_patterns, vec!["^/admin"]);
    }
}
