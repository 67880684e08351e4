//! Per-slot-name mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use starsync_types::SlotName;

/// One async mutex per slot name. Names never contend with each other.
#[derive(Debug, Default)]
pub(crate) struct SlotLocks {
    slots: Mutex<HashMap<SlotName, Arc<AsyncMutex<()>>>>,
}

impl SlotLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds `slot`, then hold it.
    pub(crate) async fn acquire(&self, slot: &SlotName) -> OwnedMutexGuard<()> {
        self.entry(slot).lock_owned().await
    }

    /// Resolve once no request holds `slot`.
    pub(crate) async fn wait_for_closed(&self, slot: &SlotName) {
        let lock = self.entry(slot);
        let _guard = lock.lock().await;
    }

    pub(crate) fn is_held(&self, slot: &SlotName) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(slot).is_some_and(|lock| lock.try_lock().is_err())
    }

    fn entry(&self, slot: &SlotName) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries nobody holds or waits on can be recreated on demand.
        slots.retain(|_, lock| Arc::strong_count(lock) > 1);
        slots.entry(slot.clone()).or_default().clone()
    }
}
