//! Slot name validation.
//!
//! Valid slot names:
//! - Must be 1 to 100 characters long
//! - May only contain ASCII letters, digits, `-`, `.`, `_`, and `~`
//! - Must not be `.` or `..`
//!
//! These rules keep a slot name usable both as a remote key and as a single
//! path component for filesystem-backed stores.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Maximum length of a slot name.
pub const MAX_SLOT_NAME_LEN: usize = 100;

/// Prefix used by [`SlotName::generate`].
pub const TEMP_SLOT_PREFIX: &str = "snapshotTemp-";

/// Unique name of a persisted save slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotName(String);

impl SlotName {
    /// Validate and wrap a slot name.
    ///
    /// ```
    /// use starsync_types::SlotName;
    ///
    /// assert!(SlotName::new("p1").is_ok());
    /// assert!(SlotName::new("save.v2_~main").is_ok());
    /// assert!(SlotName::new("").is_err());
    /// assert!(SlotName::new("a/b").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> TypeResult<Self> {
        let name = name.into();
        let invalid = |reason: &str| TypeError::InvalidSlotName {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("slot name must not be empty"));
        }
        if name.len() > MAX_SLOT_NAME_LEN {
            return Err(invalid("slot name must be at most 100 characters"));
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
        {
            return Err(invalid(&format!("contains forbidden character: {ch:?}")));
        }
        if name == "." || name == ".." {
            return Err(invalid("must not be a relative path component"));
        }
        Ok(Self(name))
    }

    /// A fresh temporary slot name, `snapshotTemp-<n>`.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen();
        Self(format!("{TEMP_SLOT_PREFIX}{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SlotName {
    type Err = TypeError;

    fn from_str(s: &str) -> TypeResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for SlotName {
    type Error = TypeError;

    fn try_from(value: String) -> TypeResult<Self> {
        Self::new(value)
    }
}

impl From<SlotName> for String {
    fn from(name: SlotName) -> Self {
        name.0
    }
}

impl AsRef<str> for SlotName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
