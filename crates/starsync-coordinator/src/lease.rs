//! Scoped ownership of an open slot.
//!
//! A [`SlotLease`] holds the per-slot lock for the lifetime of one request
//! and remembers the handle that must be closed. Closing it explicitly
//! commits or discards that handle. If the request is abandoned instead, the
//! lease discards the handle from a spawned task and releases the slot lock
//! only after the discard finished, so the next opener never races a
//! half-closed slot. Dropped outside a tokio runtime, the lease runs the
//! discard on a throwaway current-thread runtime before unlocking.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use starsync_store::{SlotHandle, SlotStore, StoreResult};
use starsync_types::{MetadataChange, RevisionMetadata, SlotName};

pub(crate) struct SlotLease {
    store: Arc<dyn SlotStore>,
    slot: SlotName,
    guard: Option<OwnedMutexGuard<()>>,
    open: Option<SlotHandle>,
}

impl SlotLease {
    pub(crate) fn new(store: Arc<dyn SlotStore>, slot: SlotName, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            store,
            slot,
            guard: Some(guard),
            open: None,
        }
    }

    /// Remember `handle` as the one whose close releases the slot.
    pub(crate) fn track(&mut self, handle: &SlotHandle) {
        self.open = Some(handle.clone());
    }

    /// Close the slot without writing.
    pub(crate) async fn discard(mut self) -> StoreResult<()> {
        match self.open.take() {
            Some(handle) => self.store.discard_and_close(&handle).await,
            None => Ok(()),
        }
    }

    /// Commit `handle` and close the slot.
    ///
    /// If the commit fails, the handle is discarded before the error is
    /// returned so the slot does not stay open.
    pub(crate) async fn commit(
        mut self,
        handle: SlotHandle,
        change: MetadataChange,
    ) -> StoreResult<RevisionMetadata> {
        self.open = Some(handle.clone());
        match self.store.commit_and_close(handle, change).await {
            Ok(metadata) => {
                self.open = None;
                Ok(metadata)
            }
            Err(e) => {
                if let Some(handle) = self.open.take() {
                    if let Err(discard) = self.store.discard_and_close(&handle).await {
                        debug!(slot = %self.slot, error = %discard, "discard after failed commit");
                    }
                }
                Err(e)
            }
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        let Some(handle) = self.open.take() else {
            return;
        };
        let guard = self.guard.take();
        let store = self.store.clone();
        let slot = self.slot.clone();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            warn!(%slot, "request abandoned with an open handle, discarding");
            runtime.spawn(async move {
                if let Err(e) = store.discard_and_close(&handle).await {
                    warn!(%slot, error = %e, "failed to discard abandoned handle");
                }
                drop(guard);
            });
            return;
        }

        // Outside any runtime the discard runs to completion here.
        match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => {
                warn!(%slot, "handle dropped outside a runtime, discarding in place");
                if let Err(e) = runtime.block_on(store.discard_and_close(&handle)) {
                    warn!(%slot, error = %e, "failed to discard abandoned handle");
                }
                drop(guard);
            }
            Err(e) => {
                // The store still holds the slot open; keep it locked so no
                // later request runs into AlreadyOpen.
                warn!(%slot, error = %e, "cannot discard abandoned handle, slot stays locked");
                std::mem::forget(guard);
            }
        }
    }
}
