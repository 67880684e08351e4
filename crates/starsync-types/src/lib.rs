//! Foundation types for starsync.
//!
//! This crate provides the domain entity that is synchronized across devices
//! and the identifiers shared by the store and the coordinator. Every other
//! starsync crate depends on `starsync-types`.
//!
//! # Key Types
//!
//! - [`SaveGame`]: Sparse grid of star ratings with a lossless max-merge
//! - [`LevelKey`]: A (world, level) coordinate, rendered as `"<world>-<level>"`
//! - [`SlotName`]: Validated unique name of a save slot
//! - [`RevisionId`] / [`ConflictId`]: UUID v7 identifiers issued by a store
//! - [`RevisionMetadata`] / [`MetadataChange`]: Descriptive data attached to a revision

pub mod error;
pub mod revision;
pub mod savegame;
pub mod slot;

pub use error::{TypeError, TypeResult};
pub use revision::{ConflictId, CoverImage, MetadataChange, RevisionId, RevisionMetadata};
pub use savegame::{LevelKey, SaveGame, MAX_STARS, SERIAL_VERSION};
pub use slot::SlotName;
