//! Rule resolution: static configuration merged with persisted records.

use super::error::{RecordError, RestrictionError, RestrictionResult};
use super::records::RuleRecordSource;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Deduplicated union of static and active persisted values.
    pub values: HashSet<String>,

    /// `false` when the record source failed and only static values are present.
    pub complete: bool,
}

/// Which record collection a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Allowlist,
    ProtectedPaths,
}

impl RecordKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Allowlist => "allowlist",
            Self::ProtectedPaths => "protected_paths",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Allowlist => 0,
            Self::ProtectedPaths => 1,
        }
    }
}

type LookupOutcome = Result<Vec<String>, String>;

#[derive(Debug, Default)]
struct LookupState {
    next_id: u64,
    in_flight: Option<u64>,
    finished: Option<(u64, LookupOutcome)>,
}

/// Single-flight lookup for one record kind.
///
/// At most one worker runs per kind. Callers that arrive while it runs wait
/// on the same result; a worker stuck past the timeout is joined rather than
/// replaced.
#[derive(Debug, Default)]
struct LookupSlot {
    state: Mutex<LookupState>,
    done: Condvar,
}

impl LookupSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, LookupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, id: u64, outcome: LookupOutcome) {
        let mut state = self.lock();
        if state.in_flight == Some(id) {
            state.in_flight = None;
        }
        let newer = state.finished.as_ref().map_or(true, |(done, _)| *done < id);
        if newer {
            state.finished = Some((id, outcome));
        }
        drop(state);
        self.done.notify_all();
    }
}

/// Per-kind lookup slots, shared by clones of a store.
#[derive(Debug, Default)]
struct Lookups {
    slots: [LookupSlot; 2],
    degraded: [AtomicBool; 2],
}

/// Resolves the allow-list and protected-path sets.
///
/// Holds no mutable rule state. Each call reads the static lists and, when a
/// record source is attached, queries it on a worker thread bounded by the
/// lookup timeout. A failed or slow source degrades the result to the static
/// list; it never fails the call.
#[derive(Clone)]
pub struct RuleStore {
    static_allowed: Vec<String>,
    static_patterns: Vec<String>,
    source: Option<Arc<dyn RuleRecordSource>>,
    lookup_timeout: Duration,
    lookup_retries: u32,
    lookups: Arc<Lookups>,
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("static_allowed", &self.static_allowed.len())
            .field("static_patterns", &self.static_patterns.len())
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("lookup_timeout", &self.lookup_timeout)
            .field("lookup_retries", &self.lookup_retries)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

impl RuleStore {
    /// Create a store over static lists only.
    #[must_use]
    pub fn new(static_allowed: Vec<String>, static_patterns: Vec<String>) -> Self {
        Self {
            static_allowed,
            static_patterns,
            source: None,
            lookup_timeout: Duration::from_millis(500),
            lookup_retries: 1,
            lookups: Arc::new(Lookups::default()),
        }
    }

    /// Attach a persisted-record source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn RuleRecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Bound each record lookup attempt.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Number of extra attempts after a failed lookup.
    #[must_use]
    pub fn with_lookup_retries(mut self, retries: u32) -> Self {
        self.lookup_retries = retries;
        self
    }

    /// Resolve the allowed addresses and networks.
    #[must_use]
    pub fn resolve_allowed_addresses(&self) -> Resolved {
        self.resolve(&self.static_allowed, RecordKind::Allowlist)
    }

    /// Resolve the protected-path patterns.
    #[must_use]
    pub fn resolve_protected_patterns(&self) -> Resolved {
        self.resolve(&self.static_patterns, RecordKind::ProtectedPaths)
    }

    /// Whether the latest resolution of either rule set fell back to static values.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.lookups
            .degraded
            .iter()
            .any(|flag| flag.load(Ordering::Relaxed))
    }

    /// Whether a record source is attached.
    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Stop handing in-flight lookups to new callers.
    ///
    /// Callers already waiting keep their lookup; later callers start a fresh
    /// one so they observe records written after this call.
    pub fn detach_in_flight(&self) {
        for slot in &self.lookups.slots {
            slot.lock().in_flight = None;
        }
    }

    fn resolve(&self, static_values: &[String], kind: RecordKind) -> Resolved {
        let mut values: HashSet<String> = static_values.iter().cloned().collect();

        let Some(source) = &self.source else {
            return Resolved {
                values,
                complete: true,
            };
        };

        let degraded = &self.lookups.degraded[kind.index()];
        match self.lookup_with_retries(source, kind) {
            Ok(records) => {
                debug!(
                    kind = kind.as_str(),
                    source = source.name(),
                    records = records.len(),
                    "resolved persisted rules"
                );
                values.extend(records);
                degraded.store(false, Ordering::Relaxed);
                Resolved {
                    values,
                    complete: true,
                }
            },
            Err(e) => {
                warn!(
                    kind = kind.as_str(),
                    source = source.name(),
                    error = %e,
                    "rule record source unavailable, using static rules only"
                );
                degraded.store(true, Ordering::Relaxed);
                Resolved {
                    values,
                    complete: false,
                }
            },
        }
    }

    fn lookup_with_retries(
        &self,
        source: &Arc<dyn RuleRecordSource>,
        kind: RecordKind,
    ) -> RestrictionResult<Vec<String>> {
        let attempts = self.lookup_retries.saturating_add(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.lookup_once(source, kind) {
                Ok(records) => return Ok(records),
                Err(e) => {
                    debug!(kind = kind.as_str(), attempt, error = %e, "record lookup failed");
                    last_err = Some(e);
                },
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RestrictionError::RecordSourceUnavailable("no lookup attempted".to_string())
        }))
    }

    fn lookup_once(
        &self,
        source: &Arc<dyn RuleRecordSource>,
        kind: RecordKind,
    ) -> RestrictionResult<Vec<String>> {
        let slot = &self.lookups.slots[kind.index()];
        let mut state = slot.lock();

        let id = match state.in_flight {
            Some(id) => id,
            None => {
                let id = state.next_id;
                state.next_id += 1;

                let lookups = Arc::clone(&self.lookups);
                let source = Arc::clone(source);
                thread::Builder::new()
                    .name(format!("rule-lookup-{}", kind.as_str()))
                    .spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match kind {
                            RecordKind::Allowlist => source.active_allowlist(),
                            RecordKind::ProtectedPaths => source.active_protected_patterns(),
                        }))
                        .unwrap_or_else(|_| {
                            Err(RecordError::Unavailable("lookup worker panicked".to_string()))
                        })
                        .map_err(|e| RestrictionError::from(e).to_string());
                        lookups.slots[kind.index()].complete(id, outcome);
                    })
                    .map_err(|e| RestrictionError::RecordSourceUnavailable(e.to_string()))?;

                state.in_flight = Some(id);
                id
            },
        };

        let (state, _) = slot
            .done
            .wait_timeout_while(state, self.lookup_timeout, |s| {
                !matches!(&s.finished, Some((done, _)) if *done >= id)
            })
            .unwrap_or_else(PoisonError::into_inner);

        match &state.finished {
            Some((done, outcome)) if *done >= id => outcome
                .clone()
                .map_err(RestrictionError::RecordSourceUnavailable),
            _ => Err(RestrictionError::RecordLookupTimeout(self.lookup_timeout)),
        }
    }
}
