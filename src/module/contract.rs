//! The lifecycle contract for managed modules.

use super::{ModuleConfig, ModuleError, ModuleResult, ModuleStatus};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Metrics payload containing module-specific metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsPayload {
    /// Counter metrics (monotonically increasing).
    pub counters: BTreeMap<String, u64>,

    /// Gauge metrics (can go up and down).
    pub gauges: BTreeMap<String, f64>,
}

impl MetricsPayload {
    /// Creates a new empty metrics payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter metric.
    pub fn counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    /// Adds a gauge metric.
    pub fn gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    /// Formats metrics in Prometheus text format, sorted by name.
    #[must_use]
    pub fn to_prometheus(&self, prefix: &str) -> String {
        let mut output = String::new();

        for (name, value) in &self.counters {
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        for (name, value) in &self.gauges {
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        output
    }
}

/// Lifecycle contract for a module hosted by a gateway.
///
/// # Lifecycle
///
/// 1. `init()` - Validate and store configuration
/// 2. `start()` - Begin processing
/// 3. `status()` / `metrics()` - Ongoing monitoring
/// 4. `reload()` - Apply new configuration (optional)
/// 5. `stop()` - Shutdown
pub trait ModuleContract: Send + Sync {
    /// Module name used in logs and metric prefixes.
    fn name(&self) -> &str;

    /// Initializes the module with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the configuration is invalid.
    /// Returns `ModuleError::InvalidState` if the module is not stopped.
    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()>;

    /// Starts the module's processing.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::StartFailed` if the module cannot start.
    /// Returns `ModuleError::InvalidState` if called before `init()`.
    fn start(&mut self) -> ModuleResult<()>;

    /// Stops the module and releases its resources.
    ///
    /// # Errors
    ///
    /// Implementations may fail if shutdown cannot complete.
    fn stop(&mut self) -> ModuleResult<()>;

    /// Applies new configuration without a restart.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the new configuration is invalid
    /// or hot reload is not supported.
    fn reload(&mut self, _config: ModuleConfig) -> ModuleResult<()> {
        Err(ModuleError::ConfigError(
            "hot reload not supported".to_string(),
        ))
    }

    /// Returns the current status of the module.
    fn status(&self) -> ModuleStatus;

    /// Returns the current metrics from the module.
    fn metrics(&self) -> MetricsPayload;

    /// Liveness check. Defaults to [`ModuleStatus::is_operational`].
    fn heartbeat(&self) -> bool {
        self.status().is_operational()
    }
}
