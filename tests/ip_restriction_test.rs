//! Integration tests for the IP restriction filter.

use pathgate::config::{BasicValidator, ConfigLoader, StaticRuleValidator};
use pathgate::module::{ModuleConfig, ModuleContract, ModuleStatus};
use pathgate::modules::ip_restriction::{
    AccessDecisionEngine, FileRecordStore, IpRestrictionConfig, IpRestrictionHandler, RecordResult,
    RequestContext, RequestOutcome, RuleAdmin, RuleCache, RuleRecordSource, RuleRecordStore,
    RuleStore, Verdict,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const CONFIG: &str = r#"
[service]
name = "integration"

[ip_restriction]
allowed_addresses = ["203.0.113.5", "10.0.0.0/24"]
protected_path_patterns = ["^/admin"]
cache_ttl_seconds = 300
"#;

fn request(path: &str, peer: &str) -> RequestContext {
    RequestContext::new().with_path(path).with_peer_address(peer)
}

fn started(
    config: &IpRestrictionConfig,
    records: Option<Arc<FileRecordStore>>,
) -> IpRestrictionHandler {
    let mut handler = IpRestrictionHandler::new();
    if let Some(records) = records {
        handler = handler.with_record_source(records);
    }
    handler
        .init(ModuleConfig::from_section(config).unwrap())
        .unwrap();
    handler.start().unwrap();
    handler
}

#[test]
fn test_reference_scenarios() {
    let config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_str(CONFIG)
        .unwrap();
    let handler = started(&config.ip_restriction, None);

    // allow-listed client on a protected path
    let decision = handler.check_request(&request("/admin/users", "203.0.113.5"));
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(decision.path_protected);

    // unknown client on a protected path
    let decision = handler.check_request(&request("/admin/users", "198.51.100.9"));
    assert_eq!(decision.verdict, Verdict::Deny);
    match decision.outcome {
        RequestOutcome::Forbidden(response) => {
            assert_eq!(response.status().as_u16(), 403);
            assert_eq!(
                response.body().as_ref(),
                b"Access Denied: Your IP address is not allowed."
            );
        },
        RequestOutcome::Passthrough => panic!("expected forbidden"),
    }

    // unprotected path, address never consulted
    let decision = handler.check_request(&request("/public/home", "198.51.100.9"));
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(decision.client_address.is_none());

    // CIDR containment
    assert!(handler.check_request(&request("/admin", "10.0.0.200")).is_allowed());
    assert!(!handler.check_request(&request("/admin", "10.0.1.5")).is_allowed());

    // forwarded-for chain, first hop is the client
    let decision = handler.check_request(
        &request("/admin", "70.41.3.18").with_forwarded_for("203.0.113.5, 70.41.3.18"),
    );
    assert!(decision.is_allowed());
    assert_eq!(decision.client_address.as_deref(), Some("203.0.113.5"));
}

#[test]
fn test_admin_changes_through_file_store() {
    let dir = tempdir().unwrap();
    let records = Arc::new(FileRecordStore::new(dir.path().join("records.json")));
    let config = IpRestrictionConfig::new().with_protected(["^/admin"]);
    let handler = started(&config, Some(Arc::clone(&records)));

    let admin = RuleAdmin::new(records.clone()).with_listener(Arc::new(handler.invalidator()));

    let admin_request = request("/admin", "192.0.2.10");
    assert!(!handler.check_request(&admin_request).is_allowed());

    admin
        .add_or_update_allowlist_entry("192.0.2.0/28", Some("bastion"))
        .unwrap();
    assert!(handler.check_request(&admin_request).is_allowed());

    admin.set_allowlist_active("192.0.2.0/28", false).unwrap();
    assert!(!handler.check_request(&admin_request).is_allowed());

    // new protected path from records
    assert!(handler.check_request(&request("/ops/deploy", "192.0.2.10")).is_allowed());
    admin.add_or_update_protected_path("^/ops", None).unwrap();
    assert!(!handler.check_request(&request("/ops/deploy", "192.0.2.10")).is_allowed());

    admin.remove_protected_path("^/ops").unwrap();
    assert!(handler.check_request(&request("/ops/deploy", "192.0.2.10")).is_allowed());

    // the document on disk reflects every change
    let reopened = FileRecordStore::new(records.path());
    let entries = reopened.allowlist().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].description, "bastion");
    assert!(!entries[0].active);
    assert!(reopened.protected_paths().unwrap().is_empty());
}

#[test]
fn test_external_edit_visible_after_ttl() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("records.json");
    let records = Arc::new(FileRecordStore::new(&path));

    let store = RuleStore::new(Vec::new(), vec!["^/admin".to_string()])
        .with_source(records.clone());
    let engine = AccessDecisionEngine::new(Arc::new(RuleCache::new(
        store,
        Duration::from_millis(50),
    )));

    let admin_request = request("/admin", "192.0.2.77");
    assert!(!engine.check_request(&admin_request).is_allowed());

    // an admin in another process has no listener for this cache
    let admin = RuleAdmin::new(Arc::new(FileRecordStore::new(&path)));
    admin
        .add_or_update_allowlist_entry("192.0.2.77", None)
        .unwrap();
    assert!(!engine.check_request(&admin_request).is_allowed());

    thread::sleep(Duration::from_millis(80));
    assert!(engine.check_request(&admin_request).is_allowed());
}

#[test]
fn test_corrupt_record_file_degrades() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("records.json");
    std::fs::write(&path, "{ not json").unwrap();

    let config = ConfigLoader::new().load_str(CONFIG).unwrap();
    let handler = started(
        &config.ip_restriction,
        Some(Arc::new(FileRecordStore::new(&path))),
    );

    // static rules still enforced
    assert!(handler.check_request(&request("/admin", "203.0.113.5")).is_allowed());
    assert!(!handler.check_request(&request("/admin", "198.51.100.9")).is_allowed());
    assert!(matches!(handler.status(), ModuleStatus::Degraded { .. }));

    // degraded results were not cached; repairing the file recovers
    std::fs::write(&path, "{}").unwrap();
    assert!(!handler.check_request(&request("/admin", "198.51.100.9")).is_allowed());
    assert_eq!(handler.status(), ModuleStatus::Running);
}

/// Record source that never answers until released.
#[derive(Default)]
struct StalledSource {
    lookups: AtomicUsize,
    released: Mutex<bool>,
    release: Condvar,
}

impl StalledSource {
    fn stall(&self) -> RecordResult<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut released = self.released.lock().unwrap();
        while !*released {
            released = self.release.wait(released).unwrap();
        }
        Ok(Vec::new())
    }

    fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.release.notify_all();
    }
}

impl RuleRecordSource for StalledSource {
    fn active_allowlist(&self) -> RecordResult<Vec<String>> {
        self.stall()
    }

    fn active_protected_patterns(&self) -> RecordResult<Vec<String>> {
        self.stall()
    }
}

#[test]
fn test_stalled_record_source_bounds_lookups() {
    let source = Arc::new(StalledSource::default());
    let mut config = ConfigLoader::new().load_str(CONFIG).unwrap().ip_restriction;
    config.record_lookup_timeout_ms = 5;
    config.record_lookup_retries = 1;

    let mut handler = IpRestrictionHandler::new().with_record_source(source.clone());
    handler
        .init(ModuleConfig::from_section(&config).unwrap())
        .unwrap();
    handler.start().unwrap();

    for _ in 0..50 {
        assert!(handler.check_request(&request("/admin", "203.0.113.5")).is_allowed());
        assert!(!handler.check_request(&request("/admin", "198.51.100.9")).is_allowed());
    }

    // one stuck lookup per rule set, joined by every later request
    assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    assert!(matches!(handler.status(), ModuleStatus::Degraded { .. }));
    source.release();
}

#[test]
fn test_malformed_static_rules_skipped_at_runtime() {
    let raw = r#"
[ip_restriction]
allowed_addresses = ["not-an-address", "10.0.0.0/24"]
protected_path_patterns = ["^/(broken", "^/admin"]
"#;
    // strict validation rejects the file
    let strict = ConfigLoader::new()
        .with_validator(StaticRuleValidator::new())
        .load_str(raw);
    assert!(strict.is_err());

    // the runtime drops only the bad entries
    let config = ConfigLoader::new().load_str(raw).unwrap();
    let handler = started(&config.ip_restriction, None);
    assert!(handler.check_request(&request("/admin", "10.0.0.9")).is_allowed());
    assert!(!handler.check_request(&request("/admin", "10.9.0.9")).is_allowed());
    assert!(handler.check_request(&request("/other", "10.9.0.9")).is_allowed());
}

#[test]
fn test_concurrent_requests_with_invalidation() {
    let config = ConfigLoader::new().load_str(CONFIG).unwrap();
    let handler = Arc::new(started(&config.ip_restriction, None));
    let barrier = Arc::new(Barrier::new(5));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let handler = Arc::clone(&handler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    assert!(handler.check_request(&request("/admin", "10.0.0.1")).is_allowed());
                    assert!(!handler.check_request(&request("/admin", "10.0.9.1")).is_allowed());
                }
            })
        })
        .collect();

    barrier.wait();
    for _ in 0..50 {
        handler.on_rule_mutation();
    }
    for worker in workers {
        worker.join().unwrap();
    }

    let metrics = handler.metrics();
    assert_eq!(metrics.counters.get("requests_checked"), Some(&1600));
    assert_eq!(metrics.counters.get("requests_denied"), Some(&800));
    assert_eq!(handler.stats().requests_allowed.load(Ordering::Relaxed), 800);
}
