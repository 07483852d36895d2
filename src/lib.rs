//! # pathgate
//!
//! Admission control for protected request paths: requests whose path matches
//! a protected pattern are allowed only from allow-listed client addresses.
//!
//! ## Features
//!
//! - Regex path protection with prefix or full matching
//! - IPv4/IPv6 allow-lists with CIDR ranges
//! - Static rules merged with persisted records, cached with a TTL
//! - Explicit cache invalidation on administrative changes
//! - Degrades to static rules when the record source is unavailable
//!
//! ## Architecture
//!
//! The filter lives in [`modules::ip_restriction`] and is hosted through the
//! [`module::ModuleContract`] lifecycle. [`config`] loads the TOML
//! configuration and [`logging`] installs the tracing subscriber.

pub mod config;
pub mod logging;
pub mod module;
pub mod modules;
