//! Slot state shared by every backend.
//!
//! A [`SlotRecord`] is the persisted state of one slot: its current revision
//! and a queue of divergent revisions that have not been reconciled yet. The
//! functions here implement the open/commit/resolve transitions as pure
//! operations on that record; backends only add locking and persistence.

use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use starsync_types::{ConflictId, MetadataChange, RevisionId, RevisionMetadata};

use crate::error::{StoreError, StoreResult};
use crate::lease::LeaseToken;
use crate::types::{OpenOutcome, OpenTarget, Resolution, SlotConflict, SlotHandle};

/// One committed revision: metadata plus payload bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRevision {
    pub metadata: RevisionMetadata,
    pub payload: Vec<u8>,
}

impl StoredRevision {
    /// Build a new revision from `metadata`, assigning a fresh id and
    /// timestamp and applying `change`.
    pub fn derive(
        mut metadata: RevisionMetadata,
        payload: Vec<u8>,
        change: &MetadataChange,
    ) -> Self {
        metadata.revision_id = RevisionId::new();
        metadata.last_modified = Utc::now();
        change.apply_to(&mut metadata);
        Self { metadata, payload }
    }

    pub fn id(&self) -> RevisionId {
        self.metadata.revision_id
    }

    fn handle(&self, lease: LeaseToken, base: Option<RevisionId>) -> SlotHandle {
        SlotHandle::new(lease, base, self.metadata.clone(), self.payload.clone())
    }
}

/// Persisted state of one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub current: StoredRevision,
    /// Revisions that diverged from `current`, oldest first.
    #[serde(default)]
    pub divergent: VecDeque<StoredRevision>,
    /// Id issued for the conflict between `current` and the oldest
    /// divergent revision, once surfaced.
    #[serde(default)]
    pub conflict_id: Option<ConflictId>,
}

impl SlotRecord {
    pub fn new(current: StoredRevision) -> Self {
        Self {
            current,
            divergent: VecDeque::new(),
            conflict_id: None,
        }
    }

    pub fn has_conflict(&self) -> bool {
        !self.divergent.is_empty()
    }

    pub fn contains_revision(&self, id: &RevisionId) -> bool {
        &self.current.id() == id || self.divergent.iter().any(|r| &r.id() == id)
    }

    /// Present the record to an opener holding `lease`.
    ///
    /// Yields a conflict while any divergent revision is queued. The conflict
    /// id is stable until that conflict is resolved.
    pub fn surface(&mut self, lease: LeaseToken) -> OpenOutcome {
        let base = Some(self.current.id());
        match self.divergent.front() {
            None => OpenOutcome::Revision(self.current.handle(lease, base)),
            Some(divergent) => {
                let conflict_id = *self.conflict_id.get_or_insert_with(ConflictId::new);
                OpenOutcome::Conflict(SlotConflict {
                    conflict_id,
                    current: self.current.handle(lease, base),
                    conflicting: divergent.handle(lease, base),
                })
            }
        }
    }

    /// Replace the current revision with the chosen content and drop the
    /// divergent revision that conflict `conflict_id` referred to.
    pub fn resolve(&mut self, conflict_id: &ConflictId, resolution: Resolution) -> StoreResult<()> {
        if self.conflict_id.as_ref() != Some(conflict_id) || self.divergent.is_empty() {
            return Err(StoreError::ConflictNotFound {
                slot: self.current.metadata.slot.clone(),
                conflict_id: *conflict_id,
            });
        }

        self.current = StoredRevision::derive(
            self.current.metadata.clone(),
            resolution.payload,
            &resolution.change,
        );
        self.divergent.pop_front();
        self.conflict_id = None;
        debug!(
            slot = %self.current.metadata.slot,
            %conflict_id,
            remaining = self.divergent.len(),
            "conflict resolved"
        );
        Ok(())
    }
}

/// Open `target` against the slot's record, if any.
pub fn open_record(
    record: Option<&mut SlotRecord>,
    target: &OpenTarget,
    lease: LeaseToken,
) -> StoreResult<OpenOutcome> {
    let slot = target.slot();
    match record {
        None if target.create_if_missing() => Ok(OpenOutcome::Revision(SlotHandle::new(
            lease,
            None,
            RevisionMetadata::fresh(slot.clone()),
            Vec::new(),
        ))),
        None => Err(StoreError::NotFound(slot.clone())),
        Some(record) => {
            if let OpenTarget::Revision(meta) = target {
                if !record.contains_revision(&meta.revision_id) {
                    return Err(StoreError::UnknownRevision {
                        slot: slot.clone(),
                        revision_id: meta.revision_id,
                    });
                }
            }
            Ok(record.surface(lease))
        }
    }
}

/// Apply a commit of `handle` to the slot's record.
///
/// A handle whose base is still the current revision replaces it. Otherwise
/// another writer got there first and the commit is queued as divergent.
pub fn commit_record(
    record: &mut Option<SlotRecord>,
    handle: SlotHandle,
    change: &MetadataChange,
) -> RevisionMetadata {
    let base = handle.base_revision();
    let revision = StoredRevision::derive(handle.metadata().clone(), handle.payload().to_vec(), change);
    let metadata = revision.metadata.clone();

    match record.as_mut() {
        Some(existing) if base == Some(existing.current.id()) => existing.current = revision,
        Some(existing) => {
            debug!(
                slot = %metadata.slot,
                revision = %metadata.revision_id,
                "commit on stale base, recorded as divergent"
            );
            existing.divergent.push_back(revision);
        }
        None => *record = Some(SlotRecord::new(revision)),
    }
    metadata
}

/// Record a revision written by another device.
pub fn push_divergent(record: &mut Option<SlotRecord>, revision: StoredRevision) {
    match record.as_mut() {
        Some(existing) => existing.divergent.push_back(revision),
        None => *record = Some(SlotRecord::new(revision)),
    }
}
