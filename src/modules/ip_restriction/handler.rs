//! IP restriction handler implementing ModuleContract.

use super::config::IpRestrictionConfig;
use super::engine::{
    AccessDecision, AccessDecisionEngine, DecisionStats, RequestContext, RuleMutationListener,
};
use super::records::RuleRecordSource;
use crate::module::{
    MetricsPayload, ModuleConfig, ModuleContract, ModuleError, ModuleResult, ModuleStatus,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info};

type EngineSlot = Arc<RwLock<Option<Arc<AccessDecisionEngine>>>>;

/// Forwards rule mutations to whichever engine the handler is running.
///
/// Stays valid across `reload`, which swaps the engine.
#[derive(Debug, Clone)]
pub struct EngineInvalidator {
    engine: EngineSlot,
}

impl RuleMutationListener for EngineInvalidator {
    fn on_rule_mutation(&self) {
        let engine = self
            .engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(engine) = engine {
            engine.on_rule_mutation();
        }
    }
}

/// IP restriction handler module.
pub struct IpRestrictionHandler {
    /// Configuration.
    config: IpRestrictionConfig,

    /// Persisted-record source, if any.
    source: Option<Arc<dyn RuleRecordSource>>,

    /// Running engine.
    engine: EngineSlot,

    /// Counters kept across reloads.
    stats: Arc<DecisionStats>,

    /// Lifecycle status.
    status: ModuleStatus,

    /// Start time for uptime calculation.
    started_at: Option<Instant>,
}

impl std::fmt::Debug for IpRestrictionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpRestrictionHandler")
            .field("config", &self.config)
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("running", &self.current_engine().is_some())
            .field("status", &self.status)
            .finish()
    }
}

impl IpRestrictionHandler {
    /// Create a handler with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(IpRestrictionConfig::default())
    }

    /// Create a handler with custom configuration.
    #[must_use]
    pub fn with_config(config: IpRestrictionConfig) -> Self {
        Self {
            config,
            source: None,
            engine: Arc::new(RwLock::new(None)),
            stats: Arc::new(DecisionStats::default()),
            status: ModuleStatus::Stopped,
            started_at: None,
        }
    }

    /// Attach a persisted-record source. Takes effect on the next start or reload.
    #[must_use]
    pub fn with_record_source(mut self, source: Arc<dyn RuleRecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &IpRestrictionConfig {
        &self.config
    }

    /// Evaluate a request.
    ///
    /// Requests pass through unevaluated while the handler is not running or
    /// the filter is disabled.
    pub fn check_request(&self, request: &RequestContext) -> AccessDecision {
        match self.current_engine() {
            Some(engine) => engine.check_request(request),
            None => AccessDecision::passthrough(),
        }
    }

    /// Invalidate cached rules after an administrative change.
    pub fn on_rule_mutation(&self) {
        self.invalidator().on_rule_mutation();
    }

    /// Listener to register with [`RuleAdmin`](super::admin::RuleAdmin).
    #[must_use]
    pub fn invalidator(&self) -> EngineInvalidator {
        EngineInvalidator {
            engine: Arc::clone(&self.engine),
        }
    }

    /// Decision counters.
    #[must_use]
    pub fn stats(&self) -> &DecisionStats {
        &self.stats
    }

    fn current_engine(&self) -> Option<Arc<AccessDecisionEngine>> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install_engine(&self, engine: Option<AccessDecisionEngine>) {
        let mut slot = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        *slot = engine.map(Arc::new);
    }

    fn build_engine(
        &self,
        config: &IpRestrictionConfig,
    ) -> ModuleResult<Option<AccessDecisionEngine>> {
        if !config.enabled {
            info!("IP restriction disabled, requests pass through");
            return Ok(None);
        }

        let engine = AccessDecisionEngine::from_config(config, self.source.clone())
            .map_err(|e| ModuleError::StartFailed(format!("failed to build engine: {e}")))?
            .with_stats(Arc::clone(&self.stats));
        Ok(Some(engine))
    }

    fn parse_config(config: &ModuleConfig) -> ModuleResult<Option<IpRestrictionConfig>> {
        let Some(raw) = config.raw_config() else {
            return Ok(None);
        };
        let parsed: IpRestrictionConfig = toml::from_str(raw)
            .map_err(|e| ModuleError::ConfigError(format!("failed to parse config: {e}")))?;
        parsed.validate().map_err(ModuleError::ConfigError)?;
        Ok(Some(parsed))
    }
}

impl Default for IpRestrictionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleMutationListener for IpRestrictionHandler {
    fn on_rule_mutation(&self) {
        IpRestrictionHandler::on_rule_mutation(self);
    }
}

impl ModuleContract for IpRestrictionHandler {
    fn name(&self) -> &str {
        "ip_restriction"
    }

    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        if self.status != ModuleStatus::Stopped {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "Stopped".to_string(),
            });
        }

        info!("Initializing IP restriction module");

        if let Some(parsed) = Self::parse_config(&config)? {
            self.config = parsed;
        }
        self.config.validate().map_err(ModuleError::ConfigError)?;

        self.status = ModuleStatus::Initializing;
        info!(
            allowed = self.config.allowed_addresses.len(),
            protected = self.config.protected_path_patterns.len(),
            records = self.source.is_some(),
            "IP restriction module initialized"
        );
        Ok(())
    }

    fn start(&mut self) -> ModuleResult<()> {
        if self.status != ModuleStatus::Initializing {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "Initializing".to_string(),
            });
        }

        debug!("Starting IP restriction module");
        let engine = self.build_engine(&self.config)?;
        self.install_engine(engine);

        self.status = ModuleStatus::Running;
        self.started_at = Some(Instant::now());
        info!("IP restriction module started");
        Ok(())
    }

    fn stop(&mut self) -> ModuleResult<()> {
        debug!("Stopping IP restriction module");

        self.install_engine(None);
        self.status = ModuleStatus::Stopped;
        self.started_at = None;

        info!("IP restriction module stopped");
        Ok(())
    }

    fn reload(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        let new_config = Self::parse_config(&config)?.unwrap_or_else(|| self.config.clone());
        new_config.validate().map_err(ModuleError::ConfigError)?;

        if self.status.is_operational() {
            // the previous engine keeps serving until the new one is built
            let engine = self.build_engine(&new_config)?;
            if let Some(old) = self.current_engine() {
                old.on_rule_mutation();
            }
            self.install_engine(engine);
        }

        self.config = new_config;
        info!("IP restriction configuration reloaded");
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        if self.status == ModuleStatus::Running {
            if let Some(engine) = self.current_engine() {
                if engine.cache().store().is_degraded() {
                    return ModuleStatus::Degraded {
                        reason: "rule record source unavailable, using static rules".to_string(),
                    };
                }
            }
        }
        self.status.clone()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut metrics = MetricsPayload::new();

        metrics.counter(
            "requests_checked",
            self.stats.requests_checked.load(Ordering::Relaxed),
        );
        metrics.counter(
            "requests_allowed",
            self.stats.requests_allowed.load(Ordering::Relaxed),
        );
        metrics.counter(
            "requests_denied",
            self.stats.requests_denied.load(Ordering::Relaxed),
        );
        metrics.counter(
            "unprotected_passthrough",
            self.stats.unprotected_passthrough.load(Ordering::Relaxed),
        );

        if let Some(engine) = self.current_engine() {
            let cache = engine.cache();
            let cache_stats = cache.stats();
            metrics.counter("cache_hits", cache_stats.hits.load(Ordering::Relaxed));
            metrics.counter("cache_misses", cache_stats.misses.load(Ordering::Relaxed));
            metrics.counter(
                "cache_invalidations",
                cache_stats.invalidations.load(Ordering::Relaxed),
            );
            metrics.counter(
                "cache_uncached_resolutions",
                cache_stats.uncached_resolutions.load(Ordering::Relaxed),
            );
            metrics.gauge("cache_ttl_secs", cache.ttl().as_secs_f64());
            metrics.gauge(
                "degraded",
                if cache.store().is_degraded() { 1.0 } else { 0.0 },
            );
        }

        if let Some(started) = self.started_at {
            metrics.gauge("uptime_secs", started.elapsed().as_secs_f64());
        }

        metrics
    }
}
