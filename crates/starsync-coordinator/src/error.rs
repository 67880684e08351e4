use thiserror::Error;

use starsync_store::StoreError;
use starsync_types::{ConflictId, SlotName, TypeError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The store kept reporting conflicts after the retry bound was reached.
    #[error("conflict on slot {slot} still unresolved after {attempts} attempts")]
    ConflictUnresolved { slot: SlotName, attempts: u32 },

    /// A human resolution step was abandoned.
    #[error("conflict {conflict_id} on slot {slot} was not resolved by the presenter")]
    PresenterCancelled {
        slot: SlotName,
        conflict_id: ConflictId,
    },

    #[error("corrupt payload in slot {slot}: {source}")]
    CorruptPayload {
        slot: SlotName,
        #[source]
        source: TypeError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    /// True for every failure that leaves the remote conflict in place.
    pub fn is_conflict_unresolved(&self) -> bool {
        matches!(
            self,
            Self::ConflictUnresolved { .. } | Self::PresenterCancelled { .. }
        )
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
