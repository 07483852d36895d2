//! # Configuration System
//!
//! TOML-based configuration for pathgate: parsing, defaults and validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! [service]
//! name = "edge-1"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [ip_restriction]
//! allowed_addresses = ["203.0.113.5", "10.0.0.0/24"]
//! protected_path_patterns = ["^/admin"]
//! cache_ttl_seconds = 300
//!
//! [ip_restriction.forbidden_response]
//! status = 403
//!
//! [records]
//! path = "/var/lib/pathgate/records.json"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{LogFormat, LogLevel, LoggingConfig, PathgateConfig, RecordsConfig, ServiceSection};
pub use validation::{
    BasicValidator, StaticRuleValidator, ValidationError, ValidationResult, ValidationSeverity,
    Validator,
};
