//! Per-request access decisions.

use super::cache::RuleCache;
use super::config::IpRestrictionConfig;
use super::error::RestrictionResult;
use super::records::RuleRecordSource;
use super::response::ForbiddenResponse;
use super::resolver::AddressResolver;
use super::store::RuleStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives notice that persisted rules changed.
pub trait RuleMutationListener: Send + Sync {
    /// Called after an allow-list entry or protected-path rule is created,
    /// updated or deleted.
    fn on_rule_mutation(&self);
}

impl RuleMutationListener for RuleCache {
    fn on_rule_mutation(&self) {
        self.invalidate();
    }
}

/// Request metadata the engine decides on.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request path.
    pub path: String,
    /// Directly observed peer address.
    pub peer_address: String,
    /// Forwarded-for header value, if already extracted.
    pub forwarded_for: Option<String>,
    /// Request headers, searched when `forwarded_for` is not set.
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    /// Create a new request context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the peer address.
    #[must_use]
    pub fn with_peer_address(mut self, address: impl Into<String>) -> Self {
        self.peer_address = address.into();
        self
    }

    /// Set the peer address from a socket address, dropping the port.
    #[must_use]
    pub fn with_peer_socket(mut self, socket: SocketAddr) -> Self {
        self.peer_address = socket.ip().to_string();
        self
    }

    /// Set the forwarded-for header value.
    #[must_use]
    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The request may proceed.
    Allow,
    /// The request must be rejected.
    Deny,
}

impl Verdict {
    /// Returns `true` for [`Verdict::Allow`].
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// What the host should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Hand the request on unchanged.
    Passthrough,
    /// Reply with the configured denial.
    Forbidden(ForbiddenResponse),
}

/// Result of an access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Final verdict.
    pub verdict: Verdict,
    /// Whether the path matched a protected pattern.
    pub path_protected: bool,
    /// Resolved client address; `None` when the path was not protected.
    pub client_address: Option<String>,
    /// What the host should do.
    pub outcome: RequestOutcome,
}

impl AccessDecision {
    /// A decision that lets the request through without evaluating it.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            verdict: Verdict::Allow,
            path_protected: false,
            client_address: None,
            outcome: RequestOutcome::Passthrough,
        }
    }

    /// Returns `true` if the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allow()
    }
}

/// Evaluation states. `Decided` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EvaluationState {
    Received,
    PathChecked { protected: bool },
    AddressResolved { address: String },
    Decided(Verdict),
}

/// Decision counters.
#[derive(Debug, Default)]
pub struct DecisionStats {
    /// Requests evaluated.
    pub requests_checked: AtomicU64,
    /// Requests allowed.
    pub requests_allowed: AtomicU64,
    /// Requests denied.
    pub requests_denied: AtomicU64,
    /// Requests whose path was not protected.
    pub unprotected_passthrough: AtomicU64,
}

impl DecisionStats {
    fn record(&self, verdict: Verdict, protected: bool) {
        self.requests_checked.fetch_add(1, Ordering::Relaxed);
        match verdict {
            Verdict::Allow => {
                self.requests_allowed.fetch_add(1, Ordering::Relaxed);
                if !protected {
                    self.unprotected_passthrough.fetch_add(1, Ordering::Relaxed);
                }
            },
            Verdict::Deny => {
                self.requests_denied.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

/// Decides ALLOW or DENY for each request.
///
/// Unprotected paths are allowed without looking at the client address.
/// Protected paths resolve the client address and check it against the
/// allow-list. Rule sets come from the shared [`RuleCache`].
#[derive(Debug)]
pub struct AccessDecisionEngine {
    cache: Arc<RuleCache>,
    resolver: AddressResolver,
    forbidden: ForbiddenResponse,
    stats: Arc<DecisionStats>,
}

impl AccessDecisionEngine {
    /// Create an engine over a shared cache.
    #[must_use]
    pub fn new(cache: Arc<RuleCache>) -> Self {
        Self {
            cache,
            resolver: AddressResolver::new(),
            forbidden: ForbiddenResponse::default(),
            stats: Arc::new(DecisionStats::default()),
        }
    }

    /// Build the full pipeline from configuration.
    ///
    /// Static rules come from `config`; `source`, when given, supplies the
    /// persisted records merged on each resolution.
    pub fn from_config(
        config: &IpRestrictionConfig,
        source: Option<Arc<dyn RuleRecordSource>>,
    ) -> RestrictionResult<Self> {
        let forbidden = ForbiddenResponse::from_config(&config.forbidden_response)?;

        let mut store = RuleStore::new(
            config.allowed_addresses.clone(),
            config.protected_path_patterns.clone(),
        )
        .with_lookup_timeout(config.record_lookup_timeout())
        .with_lookup_retries(config.record_lookup_retries);
        if let Some(source) = source {
            store = store.with_source(source);
        }

        let cache =
            RuleCache::new(store, config.cache_ttl()).with_match_mode(config.path_match_mode);
        let resolver = AddressResolver::new()
            .with_header(config.forwarded_for_header.clone())
            .with_trust_forwarded_for(config.trust_forwarded_for);

        Ok(Self::new(Arc::new(cache))
            .with_resolver(resolver)
            .with_forbidden_response(forbidden))
    }

    /// Share decision counters with a previous engine.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<DecisionStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Use a custom address resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: AddressResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a custom denial response.
    #[must_use]
    pub fn with_forbidden_response(mut self, response: ForbiddenResponse) -> Self {
        self.forbidden = response;
        self
    }

    /// Evaluate a request.
    pub fn check_request(&self, request: &RequestContext) -> AccessDecision {
        let mut state = EvaluationState::Received;
        let mut protected = false;
        let mut client_address = None;

        let verdict = loop {
            state = match state {
                EvaluationState::Received => {
                    protected = self.cache.protected_paths().is_protected(&request.path);
                    EvaluationState::PathChecked { protected }
                },
                EvaluationState::PathChecked { protected: false } => {
                    EvaluationState::Decided(Verdict::Allow)
                },
                EvaluationState::PathChecked { protected: true } => {
                    let forwarded_for = request
                        .forwarded_for
                        .as_deref()
                        .or_else(|| self.resolver.find_header(&request.headers));
                    let address = self.resolver.resolve(forwarded_for, &request.peer_address);
                    EvaluationState::AddressResolved { address }
                },
                EvaluationState::AddressResolved { address } => {
                    let allowed = self.cache.allowed_addresses().is_allowed(&address);
                    if !allowed {
                        warn!(
                            client_address = %address,
                            path = %request.path,
                            "access denied for client address"
                        );
                    }
                    client_address = Some(address);
                    EvaluationState::Decided(if allowed {
                        Verdict::Allow
                    } else {
                        Verdict::Deny
                    })
                },
                EvaluationState::Decided(verdict) => break verdict,
            };
        };

        self.stats.record(verdict, protected);
        debug!(
            path = %request.path,
            protected,
            verdict = ?verdict,
            "access decision"
        );

        let outcome = match verdict {
            Verdict::Allow => RequestOutcome::Passthrough,
            Verdict::Deny => RequestOutcome::Forbidden(self.forbidden.clone()),
        };

        AccessDecision {
            verdict,
            path_protected: protected,
            client_address,
            outcome,
        }
    }

    /// Invalidate cached rules after an administrative change.
    pub fn on_rule_mutation(&self) {
        debug!("rule mutation reported, invalidating cache");
        self.cache.invalidate();
    }

    /// Shared rule cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    /// Decision counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<DecisionStats> {
        &self.stats
    }
}

impl RuleMutationListener for AccessDecisionEngine {
    fn on_rule_mutation(&self) {
        AccessDecisionEngine::on_rule_mutation(self);
    }
}
