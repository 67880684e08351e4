//! Filesystem-backed slot store.
//!
//! Each slot is one JSON file, `<root>/<slot>.json`, holding its
//! [`SlotRecord`]. Files are replaced atomically (write to a temporary file in
//! the same directory, then rename), so a crash never leaves a half-written
//! record. Open handles are tracked per store instance; two processes sharing
//! a root diverge exactly like two devices would, and their stale commits
//! surface as conflicts.
//!
//! Every read-modify-write of a record runs under an exclusive advisory lock
//! on `<root>/.lock`, so instances and processes sharing a root never lose
//! each other's writes.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use starsync_types::{MetadataChange, RevisionMetadata, SlotName};

use crate::error::{StoreError, StoreResult};
use crate::lease::LeaseTable;
use crate::record::{self, SlotRecord, StoredRevision};
use crate::traits::SlotStore;
use crate::types::{OpenOutcome, OpenTarget, Resolution, SlotConflict, SlotHandle};

const RECORD_EXT: &str = ".json";
const LOCK_FILE: &str = ".lock";

/// Exclusive access to a store root, within and across processes.
///
/// The file lock is released when the file is closed on drop.
struct RootLock<'a> {
    _file: File,
    _guard: MutexGuard<'a, ()>,
}

/// A [`SlotStore`] persisting slot records under a root directory.
#[derive(Debug)]
pub struct FsSlotStore {
    root: PathBuf,
    leases: LeaseTable,
    io: Mutex<()>,
}

impl FsSlotStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "filesystem slot store opened");
        Ok(Self {
            root,
            leases: LeaseTable::new(),
            io: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Simulate another device committing `payload` to `slot`.
    pub fn push_divergent(
        &self,
        slot: &SlotName,
        payload: Vec<u8>,
        change: MetadataChange,
    ) -> StoreResult<RevisionMetadata> {
        let revision = StoredRevision::derive(RevisionMetadata::fresh(slot.clone()), payload, &change);
        let metadata = revision.metadata.clone();
        self.modify(slot, |entry| {
            record::push_divergent(entry, revision);
            Ok(())
        })?;
        debug!(%slot, revision = %metadata.revision_id, "divergent revision pushed");
        Ok(metadata)
    }

    /// Read a slot's stored record.
    pub fn record(&self, slot: &SlotName) -> StoreResult<Option<SlotRecord>> {
        let _guard = self.lock()?;
        self.load(slot)
    }

    pub fn is_open(&self, slot: &SlotName) -> bool {
        self.leases.is_open(slot)
    }

    fn path_for(&self, slot: &SlotName) -> PathBuf {
        self.root.join(format!("{slot}{RECORD_EXT}"))
    }

    fn lock(&self) -> StoreResult<RootLock<'_>> {
        let guard = self
            .io
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.root.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(RootLock {
            _file: file,
            _guard: guard,
        })
    }

    fn load(&self, slot: &SlotName) -> StoreResult<Option<SlotRecord>> {
        let bytes = match std::fs::read(self.path_for(slot)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("{slot}: {e}")))
    }

    fn persist(&self, slot: &SlotName, entry: &SlotRecord) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(entry)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(slot)).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    /// Load, mutate, and write back one slot record under the root lock.
    ///
    /// The file is only rewritten if `f` changed the record.
    fn modify<T>(
        &self,
        slot: &SlotName,
        f: impl FnOnce(&mut Option<SlotRecord>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.lock()?;
        let before = self.load(slot)?;
        let mut entry = before.clone();
        let result = f(&mut entry)?;
        if entry != before {
            match &entry {
                Some(entry) => self.persist(slot, entry)?,
                None => std::fs::remove_file(self.path_for(slot))?,
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl SlotStore for FsSlotStore {
    async fn open(&self, target: &OpenTarget) -> StoreResult<OpenOutcome> {
        let slot = target.slot();
        let lease = self.leases.acquire(slot)?;

        let outcome = self.modify(slot, |entry| record::open_record(entry.as_mut(), target, lease));
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

        self.modify(slot, |entry| {
            let entry = entry.as_mut().ok_or_else(|| StoreError::ConflictNotFound {
                slot: slot.clone(),
                conflict_id: conflict.conflict_id,
            })?;
            entry.resolve(&conflict.conflict_id, resolution)?;
            Ok(entry.surface(lease))
        })
    }

    async fn commit_and_close(
        &self,
        handle: SlotHandle,
        change: MetadataChange,
    ) -> StoreResult<RevisionMetadata> {
        let slot = handle.slot().clone();
        let lease = handle.lease();
        self.leases.check(&slot, lease)?;

        let metadata = self.modify(&slot, |entry| Ok(record::commit_record(entry, handle, &change)))?;
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
        let _guard = self.lock()?;
        let mut result = Vec::new();
        for dirent in std::fs::read_dir(&self.root)? {
            let dirent = dirent?;
            let file_name = dirent.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(RECORD_EXT)) else {
                continue;
            };
            if !stem.starts_with(prefix) {
                continue;
            }
            let Ok(slot) = SlotName::new(stem) else {
                warn!(file = ?file_name, "skipping file with invalid slot name");
                continue;
            };
            if let Some(entry) = self.load(&slot)? {
                result.push(entry.current.metadata);
            }
        }
        result.sort_by(|a, b| a.slot.cmp(&b.slot));
        Ok(result)
    }

    async fn delete(&self, slot: &SlotName) -> StoreResult<bool> {
        if self.leases.is_open(slot) {
            return Err(StoreError::AlreadyOpen(slot.clone()));
        }
        self.modify(slot, |entry| Ok(entry.take().is_some()))
    }
}
