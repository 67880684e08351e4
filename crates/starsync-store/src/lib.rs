//! Versioned save-slot storage for starsync.
//!
//! A slot store holds named save slots. Each slot has exactly one *current*
//! revision, or transiently a current revision plus divergent revisions
//! written by other devices. Divergence is never resolved by the store
//! itself: opening a diverged slot yields an explicit [`SlotConflict`] that
//! the caller must resolve.
//!
//! # Storage Backends
//!
//! All backends implement the [`SlotStore`] trait:
//!
//! - [`InMemorySlotStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsSlotStore`] -- one JSON record per slot under a root directory
//!
//! # Design Rules
//!
//! 1. A slot is open at most once per store instance; a second open of a
//!    live slot fails with [`StoreError::AlreadyOpen`].
//! 2. Every open is paired with exactly one commit or discard.
//! 3. A commit either fully replaces the current revision or has no effect.
//! 4. A commit based on a stale revision never overwrites; it is recorded as
//!    a divergent revision and surfaced as a conflict on the next open.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod lease;
pub mod memory;
pub mod record;
pub mod traits;
pub mod types;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use fs::FsSlotStore;
pub use lease::{LeaseTable, LeaseToken};
pub use memory::InMemorySlotStore;
pub use record::{SlotRecord, StoredRevision};
pub use traits::SlotStore;
pub use types::{OpenOutcome, OpenTarget, Resolution, SlotConflict, SlotHandle};
