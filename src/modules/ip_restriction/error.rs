//! Error types for IP restriction.
//!
//! None of these ever reach a request caller: the decision path logs them
//! and folds them into "rule not matched". They surface only from setup
//! APIs (config parsing, record validation, admin mutations).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for rule evaluation setup.
pub type RestrictionResult<T> = Result<T, RestrictionError>;

/// Result type for rule record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised while building or evaluating restriction rules.
#[derive(Debug, Error)]
pub enum RestrictionError {
    /// A protected-path pattern is not a valid regular expression.
    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A value could not be parsed as an IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// An allow-list entry contains `/` but is not a valid network.
    #[error("invalid CIDR notation '{entry}': {source}")]
    InvalidCidr {
        /// The offending entry.
        entry: String,
        /// Underlying parse error.
        #[source]
        source: ipnet::AddrParseError,
    },

    /// The persisted-record collaborator could not be reached.
    #[error("rule record source unavailable: {0}")]
    RecordSourceUnavailable(String),

    /// The persisted-record lookup did not finish in time.
    #[error("rule record lookup timed out after {0:?}")]
    RecordLookupTimeout(Duration),

    /// Invalid module configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by rule record stores.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Failed to read or write the backing file.
    #[error("record file '{path}': {source}")]
    Io {
        /// Path to the record file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The record document could not be (de)serialized.
    #[error("record serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A record failed validation.
    #[error("invalid record: {0}")]
    Validation(#[from] RestrictionError),

    /// No record with the given key exists.
    #[error("no record for '{0}'")]
    NotFound(String),

    /// The store cannot currently serve queries.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<RecordError> for RestrictionError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(inner) => inner,
            other => Self::RecordSourceUnavailable(other.to_string()),
        }
    }
}
