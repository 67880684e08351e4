use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::slot::SlotName;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Short representation (first 8 characters of UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one committed revision of a slot.
    RevisionId
);

uuid_id!(
    /// Identifier of a pending conflict between two divergent revisions.
    ConflictId
);

/// Cover image attached to a revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl CoverImage {
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            mime_type: "image/png".into(),
            data,
        }
    }
}

/// Descriptive data of a committed revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    pub revision_id: RevisionId,
    pub slot: SlotName,
    pub description: String,
    pub cover_image: Option<CoverImage>,
    pub last_modified: DateTime<Utc>,
    /// Total play time in milliseconds, if the game reports it.
    pub played_time_ms: Option<u64>,
    /// Game-defined progress measure; starsync records total stars.
    pub progress_value: Option<u64>,
}

impl RevisionMetadata {
    /// Metadata for a brand-new, never-committed revision of `slot`.
    pub fn fresh(slot: SlotName) -> Self {
        Self {
            revision_id: RevisionId::new(),
            slot,
            description: String::new(),
            cover_image: None,
            last_modified: Utc::now(),
            played_time_ms: None,
            progress_value: None,
        }
    }
}

/// A set of metadata updates applied at commit time.
///
/// Unset fields leave the existing metadata untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataChange {
    pub description: Option<String>,
    pub cover_image: Option<CoverImage>,
    pub played_time_ms: Option<u64>,
    pub progress_value: Option<u64>,
}

impl MetadataChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cover_image(mut self, image: CoverImage) -> Self {
        self.cover_image = Some(image);
        self
    }

    pub fn with_played_time_ms(mut self, ms: u64) -> Self {
        self.played_time_ms = Some(ms);
        self
    }

    pub fn with_progress_value(mut self, value: u64) -> Self {
        self.progress_value = Some(value);
        self
    }

    /// Fill every field that is unset here from `defaults`.
    pub fn or(self, defaults: MetadataChange) -> Self {
        Self {
            description: self.description.or(defaults.description),
            cover_image: self.cover_image.or(defaults.cover_image),
            played_time_ms: self.played_time_ms.or(defaults.played_time_ms),
            progress_value: self.progress_value.or(defaults.progress_value),
        }
    }

    /// Apply this change to `metadata`.
    pub fn apply_to(&self, metadata: &mut RevisionMetadata) {
        if let Some(description) = &self.description {
            metadata.description = description.clone();
        }
        if let Some(image) = &self.cover_image {
            metadata.cover_image = Some(image.clone());
        }
        if let Some(ms) = self.played_time_ms {
            metadata.played_time_ms = Some(ms);
        }
        if let Some(value) = self.progress_value {
            metadata.progress_value = Some(value);
        }
    }
}
