use starsync_types::{ConflictId, RevisionId, SlotName, TypeError};

/// Errors from slot store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested slot does not exist.
    #[error("slot not found: {0}")]
    NotFound(SlotName),

    /// The slot already has a live handle in this process.
    #[error("slot is already open: {0}")]
    AlreadyOpen(SlotName),

    /// The handle was already committed or discarded.
    #[error("handle for slot {0} is closed")]
    HandleClosed(SlotName),

    /// The conflict was already resolved or never existed.
    #[error("no pending conflict {conflict_id} on slot {slot}")]
    ConflictNotFound {
        slot: SlotName,
        conflict_id: ConflictId,
    },

    /// The revision named by an open request is not known for the slot.
    #[error("unknown revision {revision_id} for slot {slot}")]
    UnknownRevision {
        slot: SlotName,
        revision_id: RevisionId,
    },

    /// Serialization or deserialization of a stored record failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored name failed validation.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The remote backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
