//! Conflict resolution strategies.
//!
//! A [`ConflictResolver`] turns a [`SlotConflict`] into the content that is
//! submitted back to the store. Two strategies are provided:
//!
//! - [`MergeResolver`] max-merges both candidates. It never loses progress
//!   and never needs a human.
//! - [`PresenterResolver`] hands the conflict to a UI over a channel and
//!   waits, without any time bound, for the user to pick one candidate.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use starsync_store::{Resolution, SlotConflict, SlotHandle};
use starsync_types::{ConflictId, MetadataChange, RevisionId, RevisionMetadata, SaveGame, SlotName};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::Request;

/// Chooses the content that resolves a conflict.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// `retry` is the attempt number this resolution will be submitted as,
    /// starting at 1.
    async fn resolve(
        &self,
        conflict: &SlotConflict,
        retry: u32,
        request: Request,
    ) -> CoordinatorResult<Resolution>;
}

/// Resolves every conflict with the coordinatewise max of both saves.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeResolver;

impl MergeResolver {
    fn decode(handle: &SlotHandle) -> SaveGame {
        SaveGame::deserialize(handle.payload()).unwrap_or_else(|e| {
            warn!(
                slot = %handle.slot(),
                revision = %handle.metadata().revision_id,
                error = %e,
                "corrupt candidate treated as empty during merge"
            );
            SaveGame::new()
        })
    }
}

#[async_trait]
impl ConflictResolver for MergeResolver {
    async fn resolve(
        &self,
        conflict: &SlotConflict,
        retry: u32,
        _request: Request,
    ) -> CoordinatorResult<Resolution> {
        let merged = SaveGame::merge(&Self::decode(&conflict.current), &Self::decode(&conflict.conflicting));
        debug!(
            slot = %conflict.slot(),
            conflict_id = %conflict.conflict_id,
            retry,
            total_stars = merged.total_stars(),
            "merged conflicting saves"
        );
        let change = MetadataChange::new()
            .with_description(format!("Merged data at: {}", Utc::now().to_rfc3339()))
            .with_progress_value(merged.total_stars());
        Ok(Resolution::new(merged.serialize()).with_change(change))
    }
}

/// A conflict waiting for a human choice.
///
/// Reply with [`ConflictPrompt::choose`]. Dropping the prompt cancels the
/// resolution; the request then fails as unresolved.
#[derive(Debug)]
pub struct ConflictPrompt {
    pub slot: SlotName,
    pub conflict_id: ConflictId,
    pub retry: u32,
    pub request: Request,
    pub current: RevisionMetadata,
    pub conflicting: RevisionMetadata,
    reply: oneshot::Sender<RevisionId>,
}

impl ConflictPrompt {
    /// Pick the candidate with `revision_id`. Returns `false` if the request
    /// was abandoned in the meantime.
    pub fn choose(self, revision_id: RevisionId) -> bool {
        self.reply.send(revision_id).is_ok()
    }

    pub fn choose_current(self) -> bool {
        let id = self.current.revision_id;
        self.choose(id)
    }

    pub fn choose_conflicting(self) -> bool {
        let id = self.conflicting.revision_id;
        self.choose(id)
    }
}

/// Create a presenter resolver and the receiving end a UI listens on.
pub fn presenter_channel(capacity: usize) -> (PresenterResolver, mpsc::Receiver<ConflictPrompt>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PresenterResolver { prompts: tx }, rx)
}

/// Resolves conflicts by asking a human through [`ConflictPrompt`]s.
#[derive(Clone, Debug)]
pub struct PresenterResolver {
    prompts: mpsc::Sender<ConflictPrompt>,
}

#[async_trait]
impl ConflictResolver for PresenterResolver {
    async fn resolve(
        &self,
        conflict: &SlotConflict,
        retry: u32,
        request: Request,
    ) -> CoordinatorResult<Resolution> {
        let cancelled = || CoordinatorError::PresenterCancelled {
            slot: conflict.slot().clone(),
            conflict_id: conflict.conflict_id,
        };

        let (reply, chosen) = oneshot::channel();
        let prompt = ConflictPrompt {
            slot: conflict.slot().clone(),
            conflict_id: conflict.conflict_id,
            retry,
            request,
            current: conflict.current.metadata().clone(),
            conflicting: conflict.conflicting.metadata().clone(),
            reply,
        };
        debug!(slot = %prompt.slot, conflict_id = %prompt.conflict_id, retry, "waiting for manual conflict choice");
        self.prompts.send(prompt).await.map_err(|_| cancelled())?;

        let revision_id = chosen.await.map_err(|_| cancelled())?;
        let handle = conflict.candidate(&revision_id).ok_or_else(|| {
            warn!(slot = %conflict.slot(), %revision_id, "presenter chose an unknown revision");
            cancelled()
        })?;
        Ok(Resolution::keep(handle))
    }
}
