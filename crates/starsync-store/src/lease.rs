//! Open-handle bookkeeping shared by the store backends.
//!
//! Every open slot holds one [`LeaseToken`]. Handles carry the token they
//! were issued; commit and discard verify it before releasing the slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use starsync_types::SlotName;

use crate::error::{StoreError, StoreResult};

/// Opaque token identifying one open of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeaseToken(u64);

impl LeaseToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Table of slots currently open in this store instance.
#[derive(Debug, Default)]
pub struct LeaseTable {
    next: AtomicU64,
    open: Mutex<HashMap<SlotName, LeaseToken>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `slot` open, failing if it already is.
    pub fn acquire(&self, slot: &SlotName) -> StoreResult<LeaseToken> {
        let mut open = self.lock()?;
        if open.contains_key(slot) {
            return Err(StoreError::AlreadyOpen(slot.clone()));
        }
        let token = LeaseToken(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        open.insert(slot.clone(), token);
        Ok(token)
    }

    /// Verify that `token` is the live lease for `slot`.
    pub fn check(&self, slot: &SlotName, token: LeaseToken) -> StoreResult<()> {
        match self.lock()?.get(slot) {
            Some(live) if *live == token => Ok(()),
            _ => Err(StoreError::HandleClosed(slot.clone())),
        }
    }

    /// Close `slot` if `token` is its live lease.
    pub fn release(&self, slot: &SlotName, token: LeaseToken) -> StoreResult<()> {
        let mut open = self.lock()?;
        match open.get(slot) {
            Some(live) if *live == token => {
                open.remove(slot);
                Ok(())
            }
            _ => Err(StoreError::HandleClosed(slot.clone())),
        }
    }

    pub fn is_open(&self, slot: &SlotName) -> bool {
        self.lock().map(|open| open.contains_key(slot)).unwrap_or(false)
    }

    /// Number of slots currently open.
    pub fn open_count(&self) -> usize {
        self.lock().map(|open| open.len()).unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<SlotName, LeaseToken>>> {
        self.open
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lease table lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str) -> SlotName {
        SlotName::new(name).unwrap()
    }

    #[test]
    fn second_acquire_is_rejected() {
        let table = LeaseTable::new();
        let token = table.acquire(&slot("p1")).unwrap();
        assert!(matches!(
            table.acquire(&slot("p1")),
            Err(StoreError::AlreadyOpen(_))
        ));
        table.release(&slot("p1"), token).unwrap();
        assert!(table.acquire(&slot("p1")).is_ok());
    }

    #[test]
    fn different_slots_are_independent() {
        let table = LeaseTable::new();
        table.acquire(&slot("a")).unwrap();
        table.acquire(&slot("b")).unwrap();
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn stale_token_is_rejected() {
        let table = LeaseTable::new();
        let first = table.acquire(&slot("p1")).unwrap();
        table.release(&slot("p1"), first).unwrap();
        let _second = table.acquire(&slot("p1")).unwrap();
        assert!(matches!(
            table.check(&slot("p1"), first),
            Err(StoreError::HandleClosed(_))
        ));
        assert!(matches!(
            table.release(&slot("p1"), first),
            Err(StoreError::HandleClosed(_))
        ));
        assert!(table.is_open(&slot("p1")));
    }
}
