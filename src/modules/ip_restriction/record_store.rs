//! Reference rule record stores.
//!
//! The gateway normally reads records owned by some other system; these two
//! stores cover embedding (in-memory) and the admin CLI (a JSON document on
//! disk). Both validate records before accepting them.

use super::error::{RecordError, RecordResult};
use super::records::{AllowlistEntry, ProtectedPathRule, RuleRecordSource};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

/// Whether an upsert created a new record or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was inserted.
    Created,
    /// An existing record was updated.
    Updated,
}

/// Write side of the persisted-record collaborator.
pub trait RuleRecordStore: RuleRecordSource {
    /// All allow-list entries, active or not, ordered by address.
    fn allowlist(&self) -> RecordResult<Vec<AllowlistEntry>>;

    /// All protected-path rules, active or not, ordered by pattern.
    fn protected_paths(&self) -> RecordResult<Vec<ProtectedPathRule>>;

    /// Insert or update an allow-list entry and mark it active.
    ///
    /// A `None` description keeps the existing one on update.
    fn upsert_allowlist_entry(
        &self,
        address_or_cidr: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome>;

    /// Toggle an allow-list entry.
    fn set_allowlist_active(&self, address_or_cidr: &str, active: bool) -> RecordResult<()>;

    /// Delete an allow-list entry.
    fn remove_allowlist_entry(&self, address_or_cidr: &str) -> RecordResult<()>;

    /// Insert or update a protected-path rule and mark it active.
    fn upsert_protected_path(
        &self,
        pattern: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome>;

    /// Toggle a protected-path rule.
    fn set_protected_path_active(&self, pattern: &str, active: bool) -> RecordResult<()>;

    /// Delete a protected-path rule.
    fn remove_protected_path(&self, pattern: &str) -> RecordResult<()>;
}

/// The full record document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSet {
    /// Allow-list entries, sorted by address.
    pub allowlist: Vec<AllowlistEntry>,

    /// Protected-path rules, sorted by pattern.
    pub protected_paths: Vec<ProtectedPathRule>,
}

impl RecordSet {
    fn active_allowlist(&self) -> Vec<String> {
        self.allowlist
            .iter()
            .filter(|e| e.active)
            .map(|e| e.address_or_cidr.clone())
            .collect()
    }

    fn active_patterns(&self) -> Vec<String> {
        self.protected_paths
            .iter()
            .filter(|r| r.active)
            .map(|r| r.pattern.clone())
            .collect()
    }

    fn upsert_allowlist(
        &mut self,
        address: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        if let Some(entry) = self
            .allowlist
            .iter_mut()
            .find(|e| e.address_or_cidr == address)
        {
            if let Some(description) = description {
                entry.description = description.to_string();
            }
            entry.active = true;
            entry.updated_at = Utc::now();
            return Ok(UpsertOutcome::Updated);
        }

        let entry = AllowlistEntry::new(address).with_description(description.unwrap_or_default());
        entry.validate()?;
        self.allowlist.push(entry);
        self.allowlist
            .sort_by(|a, b| a.address_or_cidr.cmp(&b.address_or_cidr));
        Ok(UpsertOutcome::Created)
    }

    fn set_allowlist_active(&mut self, address: &str, active: bool) -> RecordResult<()> {
        let entry = self
            .allowlist
            .iter_mut()
            .find(|e| e.address_or_cidr == address)
            .ok_or_else(|| RecordError::NotFound(address.to_string()))?;
        entry.active = active;
        entry.updated_at = Utc::now();
        Ok(())
    }

    fn remove_allowlist(&mut self, address: &str) -> RecordResult<()> {
        let before = self.allowlist.len();
        self.allowlist.retain(|e| e.address_or_cidr != address);
        if self.allowlist.len() == before {
            return Err(RecordError::NotFound(address.to_string()));
        }
        Ok(())
    }

    fn upsert_path(
        &mut self,
        pattern: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        if let Some(rule) = self
            .protected_paths
            .iter_mut()
            .find(|r| r.pattern == pattern)
        {
            if let Some(description) = description {
                rule.description = description.to_string();
            }
            rule.active = true;
            rule.updated_at = Utc::now();
            return Ok(UpsertOutcome::Updated);
        }

        let rule =
            ProtectedPathRule::new(pattern).with_description(description.unwrap_or_default());
        rule.validate()?;
        self.protected_paths.push(rule);
        self.protected_paths.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        Ok(UpsertOutcome::Created)
    }

    fn set_path_active(&mut self, pattern: &str, active: bool) -> RecordResult<()> {
        let rule = self
            .protected_paths
            .iter_mut()
            .find(|r| r.pattern == pattern)
            .ok_or_else(|| RecordError::NotFound(pattern.to_string()))?;
        rule.active = active;
        rule.updated_at = Utc::now();
        Ok(())
    }

    fn remove_path(&mut self, pattern: &str) -> RecordResult<()> {
        let before = self.protected_paths.len();
        self.protected_paths.retain(|r| r.pattern != pattern);
        if self.protected_paths.len() == before {
            return Err(RecordError::NotFound(pattern.to_string()));
        }
        Ok(())
    }
}

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<RecordSet>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with records. Invalid records are rejected.
    pub fn with_records(records: RecordSet) -> RecordResult<Self> {
        for entry in &records.allowlist {
            entry.validate()?;
        }
        for rule in &records.protected_paths {
            rule.validate()?;
        }
        Ok(Self {
            records: RwLock::new(records),
        })
    }

    /// Snapshot of every record.
    #[must_use]
    pub fn snapshot(&self) -> RecordSet {
        self.read(|r| r.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&RecordSet) -> T) -> T {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut RecordSet) -> T) -> T {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl RuleRecordSource for MemoryRecordStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn active_allowlist(&self) -> RecordResult<Vec<String>> {
        Ok(self.read(RecordSet::active_allowlist))
    }

    fn active_protected_patterns(&self) -> RecordResult<Vec<String>> {
        Ok(self.read(RecordSet::active_patterns))
    }
}

impl RuleRecordStore for MemoryRecordStore {
    fn allowlist(&self) -> RecordResult<Vec<AllowlistEntry>> {
        Ok(self.read(|r| r.allowlist.clone()))
    }

    fn protected_paths(&self) -> RecordResult<Vec<ProtectedPathRule>> {
        Ok(self.read(|r| r.protected_paths.clone()))
    }

    fn upsert_allowlist_entry(
        &self,
        address_or_cidr: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        self.write(|r| r.upsert_allowlist(address_or_cidr, description))
    }

    fn set_allowlist_active(&self, address_or_cidr: &str, active: bool) -> RecordResult<()> {
        self.write(|r| r.set_allowlist_active(address_or_cidr, active))
    }

    fn remove_allowlist_entry(&self, address_or_cidr: &str) -> RecordResult<()> {
        self.write(|r| r.remove_allowlist(address_or_cidr))
    }

    fn upsert_protected_path(
        &self,
        pattern: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        self.write(|r| r.upsert_path(pattern, description))
    }

    fn set_protected_path_active(&self, pattern: &str, active: bool) -> RecordResult<()> {
        self.write(|r| r.set_path_active(pattern, active))
    }

    fn remove_protected_path(&self, pattern: &str) -> RecordResult<()> {
        self.write(|r| r.remove_path(pattern))
    }
}

/// Record store backed by a JSON document.
///
/// Every query re-reads the file, so edits made by another process are
/// picked up on the next cache miss. A missing file reads as empty.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// Create a store for the given file. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole document.
    pub fn load(&self) -> RecordResult<RecordSet> {
        if !self.path.exists() {
            return Ok(RecordSet::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| RecordError::Io {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(RecordSet::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, records: &RecordSet) -> RecordResult<()> {
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");

        let io_err = |source| RecordError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), "record file written");
        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut RecordSet) -> RecordResult<T>) -> RecordResult<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load()?;
        let out = f(&mut records)?;
        self.save(&records)?;
        Ok(out)
    }
}

impl RuleRecordSource for FileRecordStore {
    fn name(&self) -> &str {
        "file"
    }

    fn active_allowlist(&self) -> RecordResult<Vec<String>> {
        Ok(self.load()?.active_allowlist())
    }

    fn active_protected_patterns(&self) -> RecordResult<Vec<String>> {
        Ok(self.load()?.active_patterns())
    }
}

impl RuleRecordStore for FileRecordStore {
    fn allowlist(&self) -> RecordResult<Vec<AllowlistEntry>> {
        Ok(self.load()?.allowlist)
    }

    fn protected_paths(&self) -> RecordResult<Vec<ProtectedPathRule>> {
        Ok(self.load()?.protected_paths)
    }

    fn upsert_allowlist_entry(
        &self,
        address_or_cidr: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        self.modify(|r| r.upsert_allowlist(address_or_cidr, description))
    }

    fn set_allowlist_active(&self, address_or_cidr: &str, active: bool) -> RecordResult<()> {
        self.modify(|r| r.set_allowlist_active(address_or_cidr, active))
    }

    fn remove_allowlist_entry(&self, address_or_cidr: &str) -> RecordResult<()> {
        self.modify(|r| r.remove_allowlist(address_or_cidr))
    }

    fn upsert_protected_path(
        &self,
        pattern: &str,
        description: Option<&str>,
    ) -> RecordResult<UpsertOutcome> {
        self.modify(|r| r.upsert_path(pattern, description))
    }

    fn set_protected_path_active(&self, pattern: &str, active: bool) -> RecordResult<()> {
        self.modify(|r| r.set_path_active(pattern, active))
    }

    fn remove_protected_path(&self, pattern: &str) -> RecordResult<()> {
        self.modify(|r| r.remove_path(pattern))
    }
}
