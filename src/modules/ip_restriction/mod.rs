//! # IP Restriction Module
//!
//! Gates protected URL paths behind a client address allow-list.
//!
//! ## Features
//!
//! - **Protected Paths**: regex patterns, matched as a prefix (default) or in full
//! - **Allow-List**: exact addresses plus IPv4/IPv6 CIDR ranges
//! - **Persisted Records**: static config merged with records from a [`RuleRecordSource`]
//! - **Rule Cache**: TTL-bounded, explicitly invalidated on administrative changes
//! - **Graceful Degradation**: an unavailable record source falls back to static rules
//!
//! Unprotected paths are never address-checked. A protected path is allowed
//! only when the resolved client address is listed or falls inside a listed
//! network; otherwise the configured forbidden response is returned.
//!
//! ## Usage
//!
//! ```ignore
//! use pathgate::modules::ip_restriction::{IpRestrictionHandler, RequestContext};
//!
//! let mut handler = IpRestrictionHandler::new().with_record_source(records);
//! handler.init(module_config)?;
//! handler.start()?;
//!
//! let decision = handler.check_request(
//!     &RequestContext::new()
//!         .with_path("/admin/users")
//!         .with_peer_address("203.0.113.5"),
//! );
//! if !decision.is_allowed() {
//!     // reply with the forbidden response
//! }
//! ```

mod admin;
mod cache;
mod config;
mod engine;
mod error;
mod handler;
mod ip_filter;
mod path_matcher;
mod record_store;
mod records;
mod resolver;
mod response;
mod store;

pub use admin::RuleAdmin;
pub use cache::{CacheKey, CacheStats, RuleCache};
pub use config::{
    ForbiddenResponseConfig, IpRestrictionConfig, PathMatchMode, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_FORBIDDEN_BODY,
};
pub use engine::{
    AccessDecision, AccessDecisionEngine, DecisionStats, RequestContext, RequestOutcome,
    RuleMutationListener, Verdict,
};
pub use error::{RecordError, RecordResult, RestrictionError, RestrictionResult};
pub use handler::{EngineInvalidator, IpRestrictionHandler};
pub use ip_filter::{is_allowed, AllowList};
pub use path_matcher::{is_protected, PathMatcher};
pub use record_store::{
    FileRecordStore, MemoryRecordStore, RecordSet, RuleRecordStore, UpsertOutcome,
};
pub use records::{validate_allowlist_value, AllowlistEntry, ProtectedPathRule, RuleRecordSource};
pub use resolver::{AddressResolver, FORWARDED_FOR_HEADER};
pub use response::ForbiddenResponse;
pub use store::{Resolved, RuleStore};
