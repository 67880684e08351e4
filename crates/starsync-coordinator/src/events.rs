//! Observable state of in-flight slot requests.
//!
//! The coordinator logs every transition and publishes it as a [`SlotEvent`]
//! on a broadcast channel. Events are best-effort: a lagging subscriber
//! misses events but never slows a request down.

use std::fmt;

use serde::{Deserialize, Serialize};

use starsync_types::SlotName;

/// The operation that triggered an open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Request {
    Load,
    Save,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Save => write!(f, "save"),
        }
    }
}

/// States a request moves through while it holds a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotState {
    /// Request finished; the slot is closed.
    Idle,
    /// Waiting for an earlier handle on the same slot to close.
    WaitingClosed,
    /// Open request issued to the store.
    Opening,
    /// A single current revision is held.
    HaveRevision,
    /// The store reported two divergent revisions.
    Conflicted,
    /// A resolution was submitted; waiting for the store's answer.
    AwaitingRetryResult,
    /// Payload written, commit issued.
    Committing,
    /// The request failed; the slot is closed.
    Failed,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::WaitingClosed => "waiting-closed",
            Self::Opening => "opening",
            Self::HaveRevision => "have-revision",
            Self::Conflicted => "conflicted",
            Self::AwaitingRetryResult => "awaiting-retry-result",
            Self::Committing => "committing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One state transition of one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotEvent {
    pub slot: SlotName,
    pub request: Request,
    pub state: SlotState,
    /// Resolve attempts made so far by this request.
    pub retry: u32,
}
