use async_trait::async_trait;

use starsync_types::{MetadataChange, RevisionMetadata, SlotName};

use crate::error::StoreResult;
use crate::types::{OpenOutcome, OpenTarget, Resolution, SlotConflict, SlotHandle};

/// Versioned, named save-slot store.
///
/// All implementations must satisfy these invariants:
/// - A slot is open at most once at a time; `open` on a live slot fails with
///   `AlreadyOpen`.
/// - `open` and `resolve_conflict` leave the slot open whatever they return
///   on success; the returned handle (or `conflict.current`) must later be
///   passed to `commit_and_close` or `discard_and_close`.
/// - A failed `open` leaves the slot closed.
/// - A commit either fully replaces the current revision or has no effect on
///   it.
/// - Conflicts are surfaced explicitly and never resolved by the store.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Open a slot, yielding its current revision or a pending conflict.
    async fn open(&self, target: &OpenTarget) -> StoreResult<OpenOutcome>;

    /// Submit the chosen content for `conflict`.
    ///
    /// The slot stays open. The result is the resolved revision, or the next
    /// conflict if another divergent revision arrived meanwhile.
    async fn resolve_conflict(
        &self,
        conflict: &SlotConflict,
        resolution: Resolution,
    ) -> StoreResult<OpenOutcome>;

    /// Write the handle's payload as the slot's new revision and close it.
    async fn commit_and_close(
        &self,
        handle: SlotHandle,
        change: MetadataChange,
    ) -> StoreResult<RevisionMetadata>;

    /// Close the handle without writing.
    async fn discard_and_close(&self, handle: &SlotHandle) -> StoreResult<()>;

    /// Metadata of the current revision of every slot whose name starts with
    /// `prefix`, sorted by slot name.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<RevisionMetadata>>;

    /// Delete a closed slot. Returns `true` if it existed.
    async fn delete(&self, slot: &SlotName) -> StoreResult<bool>;
}
