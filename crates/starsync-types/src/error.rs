use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Payload bytes do not decode to a valid save game.
    #[error("corrupt save payload: {0}")]
    CorruptPayload(String),

    #[error("invalid star count {stars} for level {world}-{level} (max {max})")]
    InvalidStars {
        world: u32,
        level: u32,
        stars: u8,
        max: u8,
    },

    #[error("invalid level coordinate {world}-{level}: worlds and levels start at 1")]
    InvalidCoordinate { world: u32, level: u32 },

    #[error("invalid slot name {name:?}: {reason}")]
    InvalidSlotName { name: String, reason: String },
}

pub type TypeResult<T> = Result<T, TypeError>;
