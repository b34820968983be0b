use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::NaiveDate;
use tracing::debug;

use super::domain::{
    AuthorizedScope, ChangeListId, RegistryEntry, RegistryHit, RegistrySource,
};
use crate::workflows::phone::{AreaCode, PhoneKey};

type PartitionKey = (RegistrySource, AreaCode);

/// Entries of one (source, area code) pair.
#[derive(Debug, Clone, Default)]
struct Partition {
    active: HashMap<PhoneKey, RegistryEntry>,
    retired: Vec<RegistryEntry>,
}

/// Immutable view of the registry at one version.
///
/// Readers hold an `Arc` to a snapshot for as long as they need it; ingestion
/// never mutates a published snapshot.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    version: u64,
    partitions: HashMap<PartitionKey, Arc<Partition>>,
}

impl RegistrySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sources with an active listing for `phone_key` that `scope` may see.
    pub fn is_listed(
        &self,
        phone_key: &PhoneKey,
        area_code: &AreaCode,
        scope: &AuthorizedScope,
    ) -> BTreeSet<RegistrySource> {
        scope
            .sources
            .iter()
            .filter(|source| scope.authorizes(source, area_code))
            .filter(|source| self.active_entry_in(source, area_code, phone_key).is_some())
            .cloned()
            .collect()
    }

    /// Active listings for `phone_key` within the caller's scope, with their listing dates.
    pub fn lookup(&self, phone_key: &PhoneKey, scope: &AuthorizedScope) -> Vec<RegistryHit> {
        let area_code = phone_key.area_code();
        scope
            .sources
            .iter()
            .filter(|source| scope.authorizes(source, &area_code))
            .filter_map(|source| {
                self.active_entry_in(source, &area_code, phone_key)
                    .map(|entry| RegistryHit {
                        source: entry.source.clone(),
                        added_on: entry.added_on,
                    })
            })
            .collect()
    }

    pub fn active_entry(
        &self,
        phone_key: &PhoneKey,
        source: &RegistrySource,
    ) -> Option<&RegistryEntry> {
        self.active_entry_in(source, &phone_key.area_code(), phone_key)
    }

    /// Every entry ever recorded for the pair, oldest first.
    pub fn history(&self, phone_key: &PhoneKey, source: &RegistrySource) -> Vec<RegistryEntry> {
        let key = (source.clone(), phone_key.area_code());
        let Some(partition) = self.partitions.get(&key) else {
            return Vec::new();
        };

        let mut entries: Vec<RegistryEntry> = partition
            .retired
            .iter()
            .filter(|entry| &entry.phone_key == phone_key)
            .cloned()
            .collect();
        if let Some(active) = partition.active.get(phone_key) {
            entries.push(active.clone());
        }
        entries
    }

    pub fn active_count(&self) -> usize {
        self.partitions
            .values()
            .map(|partition| partition.active.len())
            .sum()
    }

    fn active_entry_in(
        &self,
        source: &RegistrySource,
        area_code: &AreaCode,
        phone_key: &PhoneKey,
    ) -> Option<&RegistryEntry> {
        self.partitions
            .get(&(source.clone(), area_code.clone()))
            .and_then(|partition| partition.active.get(phone_key))
    }
}

/// Effect of applying a single change-list entry to the draft snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryEffect {
    Added,
    Removed,
    Unchanged,
}

/// Registry read failure surfaced to the scorer and ingestion paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry store unavailable: {0}")]
    Unavailable(String),
}

/// Read access used by the risk scorer.
pub trait RegistryReader: Send + Sync {
    fn lookup(
        &self,
        phone_key: &PhoneKey,
        scope: &AuthorizedScope,
    ) -> Result<Vec<RegistryHit>, RegistryError>;
}

/// Authoritative registry state, published as atomically swapped snapshots.
#[derive(Debug, Default)]
pub struct RegistryStore {
    current: RwLock<Arc<RegistrySnapshot>>,
    writer: Mutex<()>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let guard = self
            .current
            .read()
            .map_err(|_| RegistryError::Unavailable("snapshot lock poisoned".to_string()))?;
        Ok(Arc::clone(&guard))
    }

    pub fn is_listed(
        &self,
        phone_key: &PhoneKey,
        area_code: &AreaCode,
        scope: &AuthorizedScope,
    ) -> Result<BTreeSet<RegistrySource>, RegistryError> {
        Ok(self.snapshot()?.is_listed(phone_key, area_code, scope))
    }

    /// Start a serialized write. Only one draft exists at a time; readers keep
    /// seeing the published snapshot until [`RegistryDraft::publish`].
    pub(crate) fn begin_write(&self) -> Result<RegistryDraft<'_>, RegistryError> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| RegistryError::Unavailable("writer lock poisoned".to_string()))?;
        let base = self.snapshot()?;
        Ok(RegistryDraft {
            store: self,
            _writer: writer,
            working: RegistrySnapshot::clone(&base),
        })
    }
}

impl RegistryReader for RegistryStore {
    fn lookup(
        &self,
        phone_key: &PhoneKey,
        scope: &AuthorizedScope,
    ) -> Result<Vec<RegistryHit>, RegistryError> {
        Ok(self.snapshot()?.lookup(phone_key, scope))
    }
}

/// Copy-on-write working copy. Cloning the base snapshot copies partition
/// pointers only; a partition is deep-copied the first time it is touched.
pub(crate) struct RegistryDraft<'a> {
    store: &'a RegistryStore,
    _writer: MutexGuard<'a, ()>,
    working: RegistrySnapshot,
}

impl RegistryDraft<'_> {
    pub(crate) fn add(
        &mut self,
        phone_key: PhoneKey,
        source: &RegistrySource,
        area_code: &AreaCode,
        added_on: NaiveDate,
        change_list: &ChangeListId,
    ) -> EntryEffect {
        let partition = self.partition_mut(source, area_code);
        if partition.active.contains_key(&phone_key) {
            return EntryEffect::Unchanged;
        }

        let entry = RegistryEntry {
            phone_key: phone_key.clone(),
            source: source.clone(),
            area_code: area_code.clone(),
            added_on,
            removed_on: None,
            added_by: change_list.clone(),
            removed_by: None,
        };
        partition.active.insert(phone_key, entry);
        EntryEffect::Added
    }

    pub(crate) fn remove(
        &mut self,
        phone_key: &PhoneKey,
        source: &RegistrySource,
        area_code: &AreaCode,
        removed_on: NaiveDate,
        change_list: &ChangeListId,
    ) -> EntryEffect {
        let key = (source.clone(), area_code.clone());
        let listed = self
            .working
            .partitions
            .get(&key)
            .is_some_and(|partition| partition.active.contains_key(phone_key));
        if !listed {
            return EntryEffect::Unchanged;
        }

        let partition = self.partition_mut(source, area_code);
        match partition.active.remove(phone_key) {
            Some(mut entry) => {
                entry.removed_on = Some(removed_on);
                entry.removed_by = Some(change_list.clone());
                partition.retired.push(entry);
                EntryEffect::Removed
            }
            None => EntryEffect::Unchanged,
        }
    }

    /// Swap the draft in as the current snapshot and return its version.
    pub(crate) fn publish(mut self) -> Result<u64, RegistryError> {
        self.working.version += 1;
        let version = self.working.version;
        let next = Arc::new(self.working);

        let mut current = self
            .store
            .current
            .write()
            .map_err(|_| RegistryError::Unavailable("snapshot lock poisoned".to_string()))?;
        *current = next;
        debug!(version, "published registry snapshot");
        Ok(version)
    }

    fn partition_mut(&mut self, source: &RegistrySource, area_code: &AreaCode) -> &mut Partition {
        let shared = self
            .working
            .partitions
            .entry((source.clone(), area_code.clone()))
            .or_default();
        Arc::make_mut(shared)
    }
}
