//! # Module Contract
//!
//! The lifecycle interface a host uses to manage the filter: configuration,
//! start and stop, hot reload, status and metrics.

mod config;
mod contract;
mod error;
mod status;

pub use config::ModuleConfig;
pub use contract::{MetricsPayload, ModuleContract};
pub use error::{ModuleError, ModuleResult};
pub use status::ModuleStatus;
