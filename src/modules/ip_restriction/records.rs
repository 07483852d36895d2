//! Persisted rule records and the source trait the rule store reads them through.

use super::error::{RecordResult, RestrictionError, RestrictionResult};
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// An address or CIDR network allowed to reach protected paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    /// IPv4/IPv6 host address or CIDR network. Unique within a store.
    pub address_or_cidr: String,

    /// Free-form note.
    #[serde(default)]
    pub description: String,

    /// Inactive entries are kept but never resolved.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A regular expression marking request paths as protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedPathRule {
    /// Regular expression matched against the request path.
    pub pattern: String,

    /// Free-form note.
    #[serde(default)]
    pub description: String,

    /// Inactive rules are kept but never resolved.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl AllowlistEntry {
    /// Create a new active entry stamped with the current time.
    #[must_use]
    pub fn new(address_or_cidr: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            address_or_cidr: address_or_cidr.into(),
            description: String::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Check that the address is a host address or, when it contains `/`,
    /// a CIDR network. Host bits in a network are accepted.
    pub fn validate(&self) -> RestrictionResult<()> {
        validate_allowlist_value(&self.address_or_cidr)
    }
}

impl ProtectedPathRule {
    /// Create a new active rule stamped with the current time.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            pattern: pattern.into(),
            description: String::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Check that the pattern compiles.
    pub fn validate(&self) -> RestrictionResult<()> {
        Regex::new(&self.pattern)
            .map(|_| ())
            .map_err(|source| RestrictionError::InvalidPattern {
                pattern: self.pattern.clone(),
                source,
            })
    }
}

/// Validate a single allow-list value.
pub fn validate_allowlist_value(value: &str) -> RestrictionResult<()> {
    if value.contains('/') {
        value
            .parse::<IpNet>()
            .map(|_| ())
            .map_err(|source| RestrictionError::InvalidCidr {
                entry: value.to_string(),
                source,
            })
    } else {
        value
            .parse::<IpAddr>()
            .map(|_| ())
            .map_err(|_| RestrictionError::InvalidAddress(value.to_string()))
    }
}

/// Read side of the persisted-record collaborator.
///
/// Implementations return the raw values of every *active* record. They may
/// block (a data-store read); the rule store bounds each call with a timeout.
pub trait RuleRecordSource: Send + Sync {
    /// Name used in log events.
    fn name(&self) -> &str {
        "records"
    }

    /// Addresses and networks of all active allow-list entries.
    fn active_allowlist(&self) -> RecordResult<Vec<String>>;

    /// Patterns of all active protected-path rules.
    fn active_protected_patterns(&self) -> RecordResult<Vec<String>>;
}
