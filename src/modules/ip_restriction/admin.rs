//! Administrative rule mutations.

use super::engine::RuleMutationListener;
use super::error::RecordResult;
use super::record_store::{RuleRecordStore, UpsertOutcome};
use super::records::{AllowlistEntry, ProtectedPathRule};
use std::sync::Arc;
use tracing::info;

/// Mutation surface for persisted rules.
///
/// Every successful create, update or delete notifies the registered
/// listeners so cached rule sets are dropped. Failed mutations notify
/// nobody.
pub struct RuleAdmin {
    store: Arc<dyn RuleRecordStore>,
    listeners: Vec<Arc<dyn RuleMutationListener>>,
}

impl std::fmt::Debug for RuleAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleAdmin")
            .field("store", &self.store.name())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RuleAdmin {
    /// Create an admin over a record store.
    #[must_use]
    pub fn new(store: Arc<dyn RuleRecordStore>) -> Self {
        Self {
            store,
            listeners: Vec::new(),
        }
    }

    /// Register a listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn RuleMutationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Register a listener.
    pub fn add_listener(&mut self, listener: Arc<dyn RuleMutationListener>) {
        self.listeners.push(listener);
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RuleRecordStore> {
        &self.store
    }

    /// All allow-list entries.
    pub fn list_allowlist(&self) -> RecordResult<Vec<AllowlistEntry>> {
        self.store.allowlist()
    }

    /// All protected-path rules.
    pub fn list_protected_paths(&self) -> RecordResult<Vec<ProtectedPathRule>> {
        self.store.protected_paths()
    }

    /// Add an allow-list entry, or update and reactivate an existing one.
    pub fn add_or_update_allowlist_entry(
        &self,
        address_or_cidr: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        let outcome = self
            .store
            .upsert_allowlist_entry(address_or_cidr, description)?;
        info!(address = address_or_cidr, outcome = ?outcome, "allow-list entry saved");
        self.notify();
        Ok(outcome)
    }

    /// Activate or deactivate an allow-list entry.
    pub fn set_allowlist_active(&self, address_or_cidr: &str, active: bool) -> RecordResult<()> {
        self.store.set_allowlist_active(address_or_cidr, active)?;
        info!(address = address_or_cidr, active, "allow-list entry toggled");
        self.notify();
        Ok(())
    }

    /// Delete an allow-list entry.
    pub fn remove_allowlist_entry(&self, address_or_cidr: &str) -> RecordResult<()> {
        self.store.remove_allowlist_entry(address_or_cidr)?;
        info!(address = address_or_cidr, "allow-list entry removed");
        self.notify();
        Ok(())
    }

    /// Add a protected-path rule, or update and reactivate an existing one.
    pub fn add_or_update_protected_path(
        &self,
        pattern: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        let outcome = self.store.upsert_protected_path(pattern, description)?;
        info!(pattern, outcome = ?outcome, "protected path saved");
        self.notify();
        Ok(outcome)
    }

    /// Activate or deactivate a protected-path rule.
    pub fn set_protected_path_active(&self, pattern: &str, active: bool) -> RecordResult<()> {
        self.store.set_protected_path_active(pattern, active)?;
        info!(pattern, active, "protected path toggled");
        self.notify();
        Ok(())
    }

    /// Delete a protected-path rule.
    pub fn remove_protected_path(&self, pattern: &str) -> RecordResult<()> {
        self.store.remove_protected_path(pattern)?;
        info!(pattern, "protected path removed");
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        for listener in &self.listeners {
            listener.on_rule_mutation();
        }
    }
}
