//! The save game: a sparse grid of star ratings per (world, level).
//!
//! A [`SaveGame`] only ever records non-zero star counts; an absent entry
//! means zero stars. Two saves that describe the same progress are therefore
//! structurally equal, which keeps the round-trip and merge laws exact.
//!
//! # Payload format
//!
//! ```json
//! {"version":"1.1","levels":{"1-1":3,"1-2":5}}
//! ```
//!
//! Keys are emitted in sorted order, so serialization is deterministic. A
//! zero-length payload denotes a fresh save.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Highest star rating a level can record.
pub const MAX_STARS: u8 = 5;

/// Format version written into every serialized payload.
pub const SERIAL_VERSION: &str = "1.1";

/// A (world, level) coordinate. Both components start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LevelKey {
    pub world: u32,
    pub level: u32,
}

impl LevelKey {
    /// Create a key, rejecting zero coordinates.
    pub fn new(world: u32, level: u32) -> TypeResult<Self> {
        if world == 0 || level == 0 {
            return Err(TypeError::InvalidCoordinate { world, level });
        }
        Ok(Self { world, level })
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.world, self.level)
    }
}

impl FromStr for LevelKey {
    type Err = TypeError;

    /// Parse `"<world>-<level>"`.
    fn from_str(s: &str) -> TypeResult<Self> {
        let corrupt = || TypeError::CorruptPayload(format!("malformed level key {s:?}"));
        let (world, level) = s.split_once('-').ok_or_else(corrupt)?;
        let world = world.parse::<u32>().map_err(|_| corrupt())?;
        let level = level.parse::<u32>().map_err(|_| corrupt())?;
        Self::new(world, level)
    }
}

/// Serialized shape of a [`SaveGame`].
#[derive(Serialize, Deserialize)]
struct SavePayload {
    version: String,
    levels: BTreeMap<String, u8>,
}

/// Per-player progress: star ratings keyed by [`LevelKey`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveGame {
    levels: BTreeMap<LevelKey, u8>,
}

impl SaveGame {
    /// An empty save (every level at zero stars).
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a payload produced by [`SaveGame::serialize`].
    ///
    /// An empty payload is a fresh save, not an error.
    pub fn deserialize(bytes: &[u8]) -> TypeResult<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }

        let payload: SavePayload = serde_json::from_slice(bytes)
            .map_err(|e| TypeError::CorruptPayload(e.to_string()))?;
        if payload.version != SERIAL_VERSION {
            return Err(TypeError::CorruptPayload(format!(
                "unexpected format version {:?}",
                payload.version
            )));
        }

        let mut save = Self::new();
        for (key, stars) in payload.levels {
            key.parse::<LevelKey>()
                .and_then(|key| save.set_stars(key.world, key.level, stars))
                .map_err(|e| match e {
                    TypeError::CorruptPayload(_) => e,
                    other => TypeError::CorruptPayload(other.to_string()),
                })?;
        }
        Ok(save)
    }

    /// Encode this save. Pure function of the current state.
    pub fn serialize(&self) -> Vec<u8> {
        let payload = SavePayload {
            version: SERIAL_VERSION.to_string(),
            levels: self
                .levels
                .iter()
                .map(|(key, stars)| (key.to_string(), *stars))
                .collect(),
        };
        // A string field and a map of strings to integers always serialize;
        // an empty fallback would decode as a fresh save and wipe progress.
        serde_json::to_vec(&payload).expect("save payload is always serializable")
    }

    /// Stars recorded for a level; zero if never set.
    pub fn stars_for(&self, world: u32, level: u32) -> u8 {
        self.levels
            .get(&LevelKey { world, level })
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite the stars for a level.
    ///
    /// This does not apply merge semantics: a lower value replaces a higher
    /// one. Setting zero removes the entry.
    pub fn set_stars(&mut self, world: u32, level: u32, stars: u8) -> TypeResult<()> {
        let key = LevelKey::new(world, level)?;
        if stars > MAX_STARS {
            return Err(TypeError::InvalidStars {
                world,
                level,
                stars,
                max: MAX_STARS,
            });
        }
        if stars == 0 {
            self.levels.remove(&key);
        } else {
            self.levels.insert(key, stars);
        }
        Ok(())
    }

    /// Coordinatewise maximum of two saves.
    ///
    /// Commutative, associative, and idempotent; no recorded progress from
    /// either side is lost.
    pub fn merge(a: &SaveGame, b: &SaveGame) -> SaveGame {
        let mut merged = a.clone();
        merged.merge_from(b);
        merged
    }

    /// In-place form of [`SaveGame::merge`].
    pub fn merge_from(&mut self, other: &SaveGame) {
        for (key, stars) in &other.levels {
            let entry = self.levels.entry(*key).or_insert(0);
            *entry = (*entry).max(*stars);
        }
    }

    /// Recorded levels in ascending (world, level) order.
    pub fn levels(&self) -> impl Iterator<Item = (LevelKey, u8)> + '_ {
        self.levels.iter().map(|(k, v)| (*k, *v))
    }

    /// Sum of all recorded stars.
    pub fn total_stars(&self) -> u64 {
        self.levels.values().map(|s| u64::from(*s)).sum()
    }

    /// Number of levels with at least one star.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl FromIterator<(LevelKey, u8)> for SaveGame {
    /// Collect entries, keeping the highest rating per level and clamping to
    /// [`MAX_STARS`].
    fn from_iter<I: IntoIterator<Item = (LevelKey, u8)>>(iter: I) -> Self {
        let mut save = SaveGame::new();
        for (key, stars) in iter {
            let stars = stars.min(MAX_STARS);
            if stars > save.stars_for(key.world, key.level) {
                save.levels.insert(key, stars);
            }
        }
        save
    }
}
