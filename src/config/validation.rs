//! Configuration validation system.

use super::types::PathgateConfig;
use crate::modules::ip_restriction::{validate_allowlist_value, PathMatcher};

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation issues.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &PathgateConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &PathgateConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let rules = &config.ip_restriction;

        if config.service.name.trim().is_empty() {
            result.add_error(ValidationError::error(
                "service.name",
                "Service name cannot be empty",
            ));
        }

        let status = rules.forbidden_response.status;
        if !(400..600).contains(&status) {
            result.add_error(ValidationError::error(
                "ip_restriction.forbidden_response.status",
                format!("Status must be 4xx or 5xx, got {status}"),
            ));
        }

        if rules.record_lookup_timeout_ms == 0 {
            result.add_error(ValidationError::error(
                "ip_restriction.record_lookup_timeout_ms",
                "Record lookup timeout must be greater than 0",
            ));
        } else if rules.record_lookup_timeout_ms > 10_000 {
            result.add_error(ValidationError::warning(
                "ip_restriction.record_lookup_timeout_ms",
                "Record lookups longer than 10s stall requests on every cache miss",
            ));
        }

        if rules.enabled
            && rules.protected_path_patterns.is_empty()
            && config.records.path.is_none()
        {
            result.add_error(ValidationError::warning(
                "ip_restriction.protected_path_patterns",
                "No protected paths and no record file; every request passes",
            ));
        }

        result
    }
}

/// Strict validator for static rules.
///
/// At runtime a malformed static rule is skipped with a warning. This
/// validator rejects it up front instead.
#[derive(Debug, Default)]
pub struct StaticRuleValidator;

impl StaticRuleValidator {
    /// Create a new static rule validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for StaticRuleValidator {
    fn validate(&self, config: &PathgateConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let rules = &config.ip_restriction;

        for (i, value) in rules.allowed_addresses.iter().enumerate() {
            if let Err(e) = validate_allowlist_value(value) {
                result.add_error(ValidationError::error(
                    format!("ip_restriction.allowed_addresses[{i}]"),
                    e.to_string(),
                ));
            }
        }

        for (i, pattern) in rules.protected_path_patterns.iter().enumerate() {
            if let Err(e) =
                PathMatcher::strict(std::iter::once(pattern), rules.path_match_mode)
            {
                result.add_error(ValidationError::error(
                    format!("ip_restriction.protected_path_patterns[{i}]"),
                    e.to_string(),
                ));
            }
        }

        result
    }
}
