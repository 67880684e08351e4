//! Snapshot coordination for starsync.
//!
//! The [`SnapshotCoordinator`] is the only way callers touch a slot store. It
//! guarantees three things:
//!
//! 1. At most one open handle per slot name is in flight in this process;
//!    later requests wait until the earlier handle is closed.
//! 2. Every open is paired with a commit or a discard on every exit path,
//!    including errors and abandoned requests.
//! 3. Conflicts are resolved through a [`ConflictResolver`] in a loop bounded
//!    by [`CoordinatorConfig::max_resolve_retries`], and saves never regress
//!    progress already recorded in the slot.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
mod lease;
mod locks;
pub mod resolve;

pub use config::{CoordinatorConfig, ResolutionMode};
pub use coordinator::SnapshotCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use events::{Request, SlotEvent, SlotState};
pub use resolve::{presenter_channel, ConflictPrompt, ConflictResolver, MergeResolver, PresenterResolver};
