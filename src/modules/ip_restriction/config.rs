//! Configuration for IP restriction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of cached rule sets, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default denial message.
pub const DEFAULT_FORBIDDEN_BODY: &str = "Access Denied: Your IP address is not allowed.";

/// Main configuration for the IP restriction module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpRestrictionConfig {
    /// Whether the restriction is enforced.
    pub enabled: bool,

    /// Static allow-list: exact addresses and CIDR networks.
    pub allowed_addresses: Vec<String>,

    /// Static protected-path regular expressions.
    pub protected_path_patterns: Vec<String>,

    /// Lifetime of cached rule sets. Zero disables caching.
    pub cache_ttl_seconds: u64,

    /// How patterns are matched against request paths.
    pub path_match_mode: PathMatchMode,

    /// Honor the forwarded-for header when resolving the client address.
    pub trust_forwarded_for: bool,

    /// Name of the forwarded-for header.
    pub forwarded_for_header: String,

    /// Upper bound for a single persisted-record lookup.
    pub record_lookup_timeout_ms: u64,

    /// Extra attempts after a failed record lookup.
    pub record_lookup_retries: u32,

    /// Response returned to denied requests.
    pub forbidden_response: ForbiddenResponseConfig,
}

impl Default for IpRestrictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_addresses: Vec::new(),
            protected_path_patterns: Vec::new(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            path_match_mode: PathMatchMode::Prefix,
            trust_forwarded_for: true,
            forwarded_for_header: "X-Forwarded-For".to_string(),
            record_lookup_timeout_ms: 500,
            record_lookup_retries: 1,
            forbidden_response: ForbiddenResponseConfig::default(),
        }
    }
}

impl IpRestrictionConfig {
    /// Create a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add static allow-list entries.
    #[must_use]
    pub fn with_allowed<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_addresses
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Add static protected-path patterns.
    #[must_use]
    pub fn with_protected<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_path_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Set the cache TTL in seconds.
    #[must_use]
    pub fn with_cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl_seconds = seconds;
        self
    }

    /// Set the path match mode.
    #[must_use]
    pub fn with_match_mode(mut self, mode: PathMatchMode) -> Self {
        self.path_match_mode = mode;
        self
    }

    /// Cache TTL as a duration.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Record lookup timeout as a duration.
    #[must_use]
    pub fn record_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.record_lookup_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// Only structural problems are rejected here. Malformed static rules
    /// are excluded (with a warning) at resolution time instead.
    pub fn validate(&self) -> Result<(), String> {
        if self.forwarded_for_header.trim().is_empty() {
            return Err("forwarded_for_header cannot be empty".to_string());
        }

        if self.record_lookup_timeout_ms == 0 {
            return Err("record_lookup_timeout_ms must be greater than 0".to_string());
        }

        self.forbidden_response
            .validate()
            .map_err(|e| format!("forbidden_response: {e}"))?;

        Ok(())
    }
}

/// How a protected-path pattern is matched against a normalized path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatchMode {
    /// The pattern must match at the start of the path; trailing text is ignored.
    #[default]
    Prefix,

    /// The pattern must match the whole path.
    Full,
}

/// Configured response for denied requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForbiddenResponseConfig {
    /// HTTP status code.
    pub status: u16,

    /// Response body.
    pub body: String,

    /// Content type header value.
    pub content_type: String,
}

impl Default for ForbiddenResponseConfig {
    fn default() -> Self {
        Self {
            status: 403,
            body: DEFAULT_FORBIDDEN_BODY.to_string(),
            content_type: "text/plain; charset=utf-8".to_string(),
        }
    }
}

impl ForbiddenResponseConfig {
    /// Validate the response settings.
    pub fn validate(&self) -> Result<(), String> {
        if !(400..600).contains(&self.status) {
            return Err(format!(
                "status must be a 4xx or 5xx code, got {}",
                self.status
            ));
        }
        if self.content_type.is_empty() {
            return Err("content_type cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IpRestrictionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.path_match_mode, PathMatchMode::Prefix);
        assert!(config.trust_forwarded_for);
        assert_eq!(config.forbidden_response.status, 403);
        assert_eq!(config.forbidden_response.body, DEFAULT_FORBIDDEN_BODY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: IpRestrictionConfig = toml::from_str(
            r#"
            allowed_addresses = ["203.0.113.5", "10.0.0.0/24"]
            protected_path_patterns = ["^/admin"]
            cache_ttl_seconds = 60
            path_match_mode = "full"

            [forbidden_response]
            status = 404
            body = "nope"
        "#,
        )
        .unwrap();

        assert_eq!(config.allowed_addresses.len(), 2);
        assert_eq!(config.protected_path_patterns, vec!["^/admin".to_string()]);
        assert_eq!(config.cache_ttl_seconds, 60);
        assert_eq!(config.path_match_mode, PathMatchMode::Full);
        assert_eq!(config.forbidden_response.status, 404);
        assert_eq!(
            config.forbidden_response.content_type,
            "text/plain; charset=utf-8"
        );
        assert_eq!(config.forwarded_for_header, "X-Forwarded-For");
    }

    #[test]
    fn test_builder() {
        let config = IpRestrictionConfig::new()
            .with_allowed(["10.0.0.1"])
            .with_protected(vec!["^/admin".to_string()])
            .with_cache_ttl(0)
            .with_match_mode(PathMatchMode::Full);

        assert_eq!(config.allowed_addresses, vec!["10.0.0.1".to_string()]);
        assert_eq!(config.cache_ttl(), Duration::ZERO);
        assert_eq!(config.path_match_mode, PathMatchMode::Full);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = IpRestrictionConfig::default();
        config.forbidden_response.status = 200;
        assert!(config.validate().unwrap_err().contains("4xx or 5xx"));

        let mut config = IpRestrictionConfig::default();
        config.record_lookup_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = IpRestrictionConfig::default();
        config.forwarded_for_header = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
