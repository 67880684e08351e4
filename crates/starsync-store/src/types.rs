use starsync_types::{ConflictId, MetadataChange, RevisionId, RevisionMetadata, SlotName};

use crate::lease::LeaseToken;

/// What to open: a slot by name, or the slot a known revision belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenTarget {
    Name {
        slot: SlotName,
        create_if_missing: bool,
    },
    Revision(RevisionMetadata),
}

impl OpenTarget {
    /// Open `slot`, creating an empty revision if it does not exist yet.
    pub fn name(slot: SlotName) -> Self {
        Self::Name {
            slot,
            create_if_missing: true,
        }
    }

    /// Open `slot` only if it already exists.
    pub fn existing(slot: SlotName) -> Self {
        Self::Name {
            slot,
            create_if_missing: false,
        }
    }

    pub fn slot(&self) -> &SlotName {
        match self {
            Self::Name { slot, .. } => slot,
            Self::Revision(meta) => &meta.slot,
        }
    }

    pub fn create_if_missing(&self) -> bool {
        matches!(
            self,
            Self::Name {
                create_if_missing: true,
                ..
            }
        )
    }
}

impl From<SlotName> for OpenTarget {
    fn from(slot: SlotName) -> Self {
        Self::name(slot)
    }
}

/// An open revision of a slot.
///
/// The payload may be replaced while the handle is open; the change only
/// becomes visible once the handle is committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotHandle {
    lease: LeaseToken,
    base: Option<RevisionId>,
    metadata: RevisionMetadata,
    payload: Vec<u8>,
}

impl SlotHandle {
    /// `base` is the current revision the handle was opened from, or `None`
    /// for a slot that did not exist yet.
    pub fn new(
        lease: LeaseToken,
        base: Option<RevisionId>,
        metadata: RevisionMetadata,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            lease,
            base,
            metadata,
            payload,
        }
    }

    pub fn slot(&self) -> &SlotName {
        &self.metadata.slot
    }

    pub fn lease(&self) -> LeaseToken {
        self.lease
    }

    pub fn base_revision(&self) -> Option<RevisionId> {
        self.base
    }

    pub fn metadata(&self) -> &RevisionMetadata {
        &self.metadata
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replace the payload that will be written on commit.
    pub fn write_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }
}

/// Two divergent revisions of one slot awaiting resolution.
///
/// Both handles share the slot's lease: discarding either closes the slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotConflict {
    pub conflict_id: ConflictId,
    /// The slot's current revision.
    pub current: SlotHandle,
    /// The revision that diverged from it.
    pub conflicting: SlotHandle,
}

impl SlotConflict {
    pub fn slot(&self) -> &SlotName {
        self.current.slot()
    }

    /// The candidate with the given revision id, if any.
    pub fn candidate(&self, revision_id: &RevisionId) -> Option<&SlotHandle> {
        [&self.current, &self.conflicting]
            .into_iter()
            .find(|h| &h.metadata().revision_id == revision_id)
    }
}

/// Result of an open or resolve round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    Revision(SlotHandle),
    Conflict(SlotConflict),
}

impl OpenOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// A handle whose discard closes the slot, whichever variant this is.
    pub fn handle(&self) -> &SlotHandle {
        match self {
            Self::Revision(handle) => handle,
            Self::Conflict(conflict) => &conflict.current,
        }
    }
}

/// The chosen content submitted to resolve a conflict.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub payload: Vec<u8>,
    pub change: MetadataChange,
}

impl Resolution {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            change: MetadataChange::default(),
        }
    }

    /// Resolve by keeping a candidate revision as-is.
    pub fn keep(handle: &SlotHandle) -> Self {
        let meta = handle.metadata();
        Self {
            payload: handle.payload().to_vec(),
            change: MetadataChange {
                description: Some(meta.description.clone()),
                cover_image: meta.cover_image.clone(),
                played_time_ms: meta.played_time_ms,
                progress_value: meta.progress_value,
            },
        }
    }

    pub fn with_change(mut self, change: MetadataChange) -> Self {
        self.change = change;
        self
    }
}
