//! In-memory slot store for testing and embedding.
//!
//! [`InMemorySlotStore`] keeps every slot record in a `HashMap` behind a
//! `RwLock`. Data is lost when the store is dropped.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use starsync_types::{MetadataChange, RevisionMetadata, SlotName};

use crate::error::{StoreError, StoreResult};
use crate::lease::LeaseTable;
use crate::record::{self, SlotRecord, StoredRevision};
use crate::traits::SlotStore;
use crate::types::{OpenOutcome, OpenTarget, Resolution, SlotConflict, SlotHandle};

/// An in-memory implementation of [`SlotStore`].
#[derive(Debug, Default)]
pub struct InMemorySlotStore {
    records: RwLock<HashMap<SlotName, SlotRecord>>,
    leases: LeaseTable,
}

impl InMemorySlotStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another device committing `payload` to `slot`.
    ///
    /// If the slot exists, the revision is queued as divergent and the next
    /// open surfaces a conflict. Otherwise it becomes the current revision.
    pub fn push_divergent(
        &self,
        slot: &SlotName,
        payload: Vec<u8>,
        change: MetadataChange,
    ) -> StoreResult<RevisionMetadata> {
        let revision = StoredRevision::derive(RevisionMetadata::fresh(slot.clone()), payload, &change);
        let metadata = revision.metadata.clone();

        let mut records = self.write()?;
        let mut entry = records.remove(slot);
        record::push_divergent(&mut entry, revision);
        if let Some(entry) = entry {
            records.insert(slot.clone(), entry);
        }
        debug!(%slot, revision = %metadata.revision_id, "divergent revision pushed");
        Ok(metadata)
    }

    /// Snapshot of a slot's stored record.
    pub fn record(&self, slot: &SlotName) -> StoreResult<Option<SlotRecord>> {
        Ok(self.read()?.get(slot).cloned())
    }

    /// Payload of a slot's current revision.
    pub fn current_payload(&self, slot: &SlotName) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(slot).map(|r| r.current.payload.clone()))
    }

    /// Whether `slot` has a live handle.
    pub fn is_open(&self, slot: &SlotName) -> bool {
        self.leases.is_open(slot)
    }

    /// Number of slots with a live handle.
    pub fn open_count(&self) -> usize {
        self.leases.open_count()
    }

    /// Number of stored slots.
    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<SlotName, SlotRecord>>> {
        self.records
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<SlotName, SlotRecord>>> {
        self.records
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn open(&self, target: &OpenTarget) -> StoreResult<OpenOutcome> {
        let slot = target.slot();
        let lease = self.leases.acquire(slot)?;

        let outcome = self
            .write()
            .and_then(|mut records| record::open_record(records.get_mut(slot), target, lease));
        match &outcome {
            Ok(o) => debug!(%slot, conflict = o.is_conflict(), "slot opened"),
            Err(_) => {
                let _ = self.leases.release(slot, lease);
            }
        }
        outcome
    }

    async fn resolve_conflict(
        &self,
        conflict: &SlotConflict,
        resolution: Resolution,
    ) -> StoreResult<OpenOutcome> {
        let slot = conflict.slot();
        let lease = conflict.current.lease();
        self.leases.check(slot, lease)?;

        let mut records = self.write()?;
        let entry = records
            .get_mut(slot)
            .ok_or_else(|| StoreError::ConflictNotFound {
                slot: slot.clone(),
                conflict_id: conflict.conflict_id,
            })?;
        entry.resolve(&conflict.conflict_id, resolution)?;
        Ok(entry.surface(lease))
    }

    async fn commit_and_close(
        &self,
        handle: SlotHandle,
        change: MetadataChange,
    ) -> StoreResult<RevisionMetadata> {
        let slot = handle.slot().clone();
        let lease = handle.lease();
        self.leases.check(&slot, lease)?;

        let metadata = {
            let mut records = self.write()?;
            let mut entry = records.remove(&slot);
            let metadata = record::commit_record(&mut entry, handle, &change);
            if let Some(entry) = entry {
                records.insert(slot.clone(), entry);
            }
            metadata
        };
        self.leases.release(&slot, lease)?;
        debug!(%slot, revision = %metadata.revision_id, "slot committed");
        Ok(metadata)
    }

    async fn discard_and_close(&self, handle: &SlotHandle) -> StoreResult<()> {
        self.leases.release(handle.slot(), handle.lease())?;
        debug!(slot = %handle.slot(), "slot discarded");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<RevisionMetadata>> {
        let records = self.read()?;
        let mut result: Vec<RevisionMetadata> = records
            .iter()
            .filter(|(name, _)| name.as_str().starts_with(prefix))
            .map(|(_, r)| r.current.metadata.clone())
            .collect();
        result.sort_by(|a, b| a.slot.cmp(&b.slot));
        Ok(result)
    }

    async fn delete(&self, slot: &SlotName) -> StoreResult<bool> {
        if self.leases.is_open(slot) {
            return Err(StoreError::AlreadyOpen(slot.clone()));
        }
        Ok(self.write()?.remove(slot).is_some())
    }
}
