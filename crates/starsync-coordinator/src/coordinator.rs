use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use starsync_store::{OpenOutcome, OpenTarget, SlotHandle, SlotStore, StoreError};
use starsync_types::{MetadataChange, RevisionMetadata, SaveGame, SlotName};

use crate::config::{CoordinatorConfig, ResolutionMode};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::{Request, SlotEvent, SlotState};
use crate::lease::SlotLease;
use crate::locks::SlotLocks;
use crate::resolve::{presenter_channel, ConflictPrompt, ConflictResolver, MergeResolver};

/// Serializes slot access and drives open → resolve → commit transactions.
///
/// Construct one per process and share it (it is `Send + Sync`; wrap it in an
/// `Arc` to hand it to several tasks). Requests for different slot names run
/// concurrently; requests for the same name run one after another.
pub struct SnapshotCoordinator {
    store: Arc<dyn SlotStore>,
    resolver: Arc<dyn ConflictResolver>,
    locks: SlotLocks,
    config: CoordinatorConfig,
    events: broadcast::Sender<SlotEvent>,
}

impl SnapshotCoordinator {
    /// Create a coordinator that resolves conflicts by max-merging.
    pub fn new(store: Arc<dyn SlotStore>, config: CoordinatorConfig) -> Self {
        Self::with_resolver(store, Arc::new(MergeResolver), config)
    }

    /// Create a coordinator with a custom resolution strategy.
    pub fn with_resolver(
        store: Arc<dyn SlotStore>,
        resolver: Arc<dyn ConflictResolver>,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store,
            resolver,
            locks: SlotLocks::new(),
            config,
            events,
        }
    }

    /// Create a coordinator per `config.resolution`.
    ///
    /// In manual mode the returned receiver yields a [`ConflictPrompt`] for
    /// every conflict; a UI must answer them.
    pub fn from_config(
        store: Arc<dyn SlotStore>,
        config: CoordinatorConfig,
    ) -> (Self, Option<mpsc::Receiver<ConflictPrompt>>) {
        match config.resolution {
            ResolutionMode::Auto => (Self::new(store, config), None),
            ResolutionMode::Manual => {
                let (resolver, prompts) = presenter_channel(config.prompt_capacity);
                (Self::with_resolver(store, Arc::new(resolver), config), Some(prompts))
            }
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Subscribe to state transitions of every request.
    pub fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.events.subscribe()
    }

    /// Load the save stored in `target`.
    ///
    /// The opened revision is always discarded, never committed.
    pub async fn load(&self, target: impl Into<OpenTarget>) -> CoordinatorResult<SaveGame> {
        let target = target.into();
        let slot = target.slot().clone();
        let mut lease = self.begin(&slot, Request::Load).await;
        let mut retry = 0;

        let loaded = match self
            .open_resolved(&target, Request::Load, &mut lease, &mut retry)
            .await
        {
            Ok(handle) => SaveGame::deserialize(handle.payload()).map_err(|source| {
                CoordinatorError::CorruptPayload {
                    slot: slot.clone(),
                    source,
                }
            }),
            Err(e) => Err(e),
        };

        let closed = lease.discard().await;
        let result = match (loaded, closed) {
            (Ok(save), Ok(())) => Ok(save),
            (Err(e), closed) => {
                if let Err(discard) = closed {
                    warn!(%slot, error = %discard, "discard failed after load error");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e.into()),
        };
        self.finish(&slot, Request::Load, retry, &result);
        if result.is_ok() {
            info!(%slot, "snapshot loaded");
        }
        result
    }

    /// Save `save` into `target` and commit.
    ///
    /// The committed payload is the merge of `save` with the slot's current
    /// contents, so progress recorded by other devices is kept. Fields left
    /// unset in `change` get defaults: a timestamped description and the
    /// merged save's total stars as progress value.
    pub async fn save(
        &self,
        target: impl Into<OpenTarget>,
        save: &SaveGame,
        change: Option<MetadataChange>,
    ) -> CoordinatorResult<RevisionMetadata> {
        let target = target.into();
        let slot = target.slot().clone();
        let mut lease = self.begin(&slot, Request::Save).await;
        let mut retry = 0;

        let mut handle = match self
            .open_resolved(&target, Request::Save, &mut lease, &mut retry)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(discard) = lease.discard().await {
                    warn!(%slot, error = %discard, "discard failed after open error");
                }
                let result = Err(e);
                self.finish(&slot, Request::Save, retry, &result);
                return result;
            }
        };

        let merged = Self::merge_on_write(&handle, save);
        handle.write_payload(merged.serialize());
        let defaults = MetadataChange::new()
            .with_description(format!("Modified data at: {}", Utc::now().to_rfc3339()))
            .with_progress_value(merged.total_stars());
        let change = change.unwrap_or_default().or(defaults);

        debug!(%slot, total_stars = merged.total_stars(), "writing data to snapshot");
        self.transition(&slot, Request::Save, SlotState::Committing, retry);
        let result = lease.commit(handle, change).await.map_err(CoordinatorError::from);
        self.finish(&slot, Request::Save, retry, &result);
        if let Ok(meta) = &result {
            info!(%slot, revision = %meta.revision_id, "snapshot saved");
        }
        result
    }

    /// Metadata of every slot whose name starts with `prefix`.
    pub async fn list(&self, prefix: &str) -> CoordinatorResult<Vec<RevisionMetadata>> {
        Ok(self.store.list(prefix).await?)
    }

    /// Delete `slot` once no request holds it.
    pub async fn delete(&self, slot: &SlotName) -> CoordinatorResult<()> {
        let _guard = self.locks.acquire(slot).await;
        if self.store.delete(slot).await? {
            info!(%slot, "snapshot deleted");
            Ok(())
        } else {
            Err(StoreError::NotFound(slot.clone()).into())
        }
    }

    /// Resolve once no request holds `slot`.
    pub async fn wait_for_closed(&self, slot: &SlotName) {
        self.locks.wait_for_closed(slot).await
    }

    /// Whether a request currently holds `slot`.
    pub fn is_open(&self, slot: &SlotName) -> bool {
        self.locks.is_held(slot)
    }

    async fn begin(&self, slot: &SlotName, request: Request) -> SlotLease {
        self.transition(slot, request, SlotState::WaitingClosed, 0);
        let guard = self.locks.acquire(slot).await;
        SlotLease::new(self.store.clone(), slot.clone(), guard)
    }

    /// Open `target` and resolve conflicts until a single revision is held.
    ///
    /// Every handle the store hands out is tracked by `lease`, so the slot is
    /// closed on any exit path. `retry` counts the resolve attempts made, and
    /// keeps its value when an error is returned.
    async fn open_resolved(
        &self,
        target: &OpenTarget,
        request: Request,
        lease: &mut SlotLease,
        retry: &mut u32,
    ) -> CoordinatorResult<SlotHandle> {
        let slot = target.slot();
        self.transition(slot, request, SlotState::Opening, 0);
        let mut outcome = self.store.open(target).await?;

        loop {
            lease.track(outcome.handle());
            let conflict = match outcome {
                OpenOutcome::Revision(handle) => {
                    self.transition(slot, request, SlotState::HaveRevision, *retry);
                    return Ok(handle);
                }
                OpenOutcome::Conflict(conflict) => conflict,
            };

            if *retry >= self.config.max_resolve_retries {
                warn!(%slot, conflict_id = %conflict.conflict_id, retry = *retry, "giving up on conflict");
                return Err(CoordinatorError::ConflictUnresolved {
                    slot: slot.clone(),
                    attempts: *retry,
                });
            }
            *retry += 1;
            let attempt = *retry;
            info!(%slot, conflict_id = %conflict.conflict_id, retry = attempt, "open resulted in a conflict");
            self.transition(slot, request, SlotState::Conflicted, attempt);

            let resolution = self.resolver.resolve(&conflict, attempt, request).await?;
            self.transition(slot, request, SlotState::AwaitingRetryResult, attempt);
            outcome = self.store.resolve_conflict(&conflict, resolution).await?;
        }
    }

    fn merge_on_write(handle: &SlotHandle, save: &SaveGame) -> SaveGame {
        match SaveGame::deserialize(handle.payload()) {
            Ok(existing) => SaveGame::merge(&existing, save),
            Err(e) => {
                warn!(slot = %handle.slot(), error = %e, "replacing corrupt snapshot contents");
                save.clone()
            }
        }
    }

    fn finish<T>(
        &self,
        slot: &SlotName,
        request: Request,
        retry: u32,
        result: &CoordinatorResult<T>,
    ) {
        match result {
            Ok(_) => self.transition(slot, request, SlotState::Idle, retry),
            Err(e) => {
                warn!(%slot, %request, retry, error = %e, "request failed");
                self.transition(slot, request, SlotState::Failed, retry);
            }
        }
    }

    fn transition(&self, slot: &SlotName, request: Request, state: SlotState, retry: u32) {
        debug!(%slot, %request, %state, retry, "slot state");
        let _ = self.events.send(SlotEvent {
            slot: slot.clone(),
            request,
            state,
            retry,
        });
    }
}

impl std::fmt::Debug for SnapshotCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCoordinator")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use starsync_store::{
        InMemorySlotStore, LeaseToken, Resolution, SlotConflict, StoreResult,
    };
    use starsync_types::ConflictId;

    fn slot(name: &str) -> SlotName {
        SlotName::new(name).unwrap()
    }

    fn save_of(entries: &[((u32, u32), u8)]) -> SaveGame {
        let mut s = SaveGame::new();
        for ((w, l), stars) in entries {
            s.set_stars(*w, *l, *stars).unwrap();
        }
        s
    }

    fn coordinator(store: &Arc<InMemorySlotStore>) -> SnapshotCoordinator {
        SnapshotCoordinator::new(store.clone(), CoordinatorConfig::default())
    }

    /// A store that answers every open and resolve with a fresh conflict.
    #[derive(Default)]
    struct ConflictingStore {
        resolves: AtomicU32,
        discards: AtomicU32,
        fail_resolve: bool,
    }

    impl ConflictingStore {
        fn conflict(&self) -> OpenOutcome {
            let handle = |payload: &[u8]| {
                SlotHandle::new(
                    LeaseToken::from_raw(1),
                    None,
                    RevisionMetadata::fresh(slot("p1")),
                    payload.to_vec(),
                )
            };
            OpenOutcome::Conflict(SlotConflict {
                conflict_id: ConflictId::new(),
                current: handle(&save_of(&[((1, 1), 1)]).serialize()),
                conflicting: handle(&save_of(&[((1, 1), 2)]).serialize()),
            })
        }
    }

    #[async_trait]
    impl SlotStore for ConflictingStore {
        async fn open(&self, _target: &OpenTarget) -> StoreResult<OpenOutcome> {
            Ok(self.conflict())
        }

        async fn resolve_conflict(
            &self,
            _conflict: &SlotConflict,
            _resolution: Resolution,
        ) -> StoreResult<OpenOutcome> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolve {
                return Err(StoreError::Unavailable("backend down".into()));
            }
            Ok(self.conflict())
        }

        async fn commit_and_close(
            &self,
            _handle: SlotHandle,
            _change: MetadataChange,
        ) -> StoreResult<RevisionMetadata> {
            panic!("a conflicted slot must never be committed")
        }

        async fn discard_and_close(&self, _handle: &SlotHandle) -> StoreResult<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn list(&self, _prefix: &str) -> StoreResult<Vec<RevisionMetadata>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _slot: &SlotName) -> StoreResult<bool> {
            Ok(false)
        }
    }

    /// A memory store whose commits fail.
    #[derive(Default)]
    struct FailingCommitStore {
        inner: InMemorySlotStore,
        discards: AtomicU32,
    }

    #[async_trait]
    impl SlotStore for FailingCommitStore {
        async fn open(&self, target: &OpenTarget) -> StoreResult<OpenOutcome> {
            self.inner.open(target).await
        }

        async fn resolve_conflict(
            &self,
            conflict: &SlotConflict,
            resolution: Resolution,
        ) -> StoreResult<OpenOutcome> {
            self.inner.resolve_conflict(conflict, resolution).await
        }

        async fn commit_and_close(
            &self,
            _handle: SlotHandle,
            _change: MetadataChange,
        ) -> StoreResult<RevisionMetadata> {
            Err(StoreError::Unavailable("backend down".into()))
        }

        async fn discard_and_close(&self, handle: &SlotHandle) -> StoreResult<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            self.inner.discard_and_close(handle).await
        }

        async fn list(&self, prefix: &str) -> StoreResult<Vec<RevisionMetadata>> {
            self.inner.list(prefix).await
        }

        async fn delete(&self, slot: &SlotName) -> StoreResult<bool> {
            self.inner.delete(slot).await
        }
    }

    #[tokio::test]
    async fn failed_commit_reports_error_and_closes_slot() {
        let store = Arc::new(FailingCommitStore::default());
        store
            .inner
            .push_divergent(
                &slot("p1"),
                save_of(&[((1, 1), 2)]).serialize(),
                MetadataChange::default(),
            )
            .unwrap();
        let before = store.inner.record(&slot("p1")).unwrap();
        let coordinator = SnapshotCoordinator::new(store.clone(), CoordinatorConfig::default());
        let mut events = coordinator.subscribe();

        let err = coordinator
            .save(slot("p1"), &save_of(&[((1, 2), 5)]), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Store(StoreError::Unavailable(_))
        ));
        assert_eq!(store.discards.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_open(&slot("p1")));
        assert!(!store.inner.is_open(&slot("p1")));
        assert_eq!(store.inner.record(&slot("p1")).unwrap(), before);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event.state);
        }
        assert_eq!(last, Some(SlotState::Failed));
    }

    #[tokio::test]
    async fn events_after_resolution_carry_attempt_count() {
        let store = conflicted_store().await;
        let coordinator = coordinator(&store);
        let mut events = coordinator.subscribe();

        coordinator
            .save(slot("p1"), &save_of(&[((2, 1), 1)]), None)
            .await
            .unwrap();
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push((event.state, event.retry));
        }
        assert!(seen.contains(&(SlotState::Conflicted, 1)));
        assert!(seen.contains(&(SlotState::Committing, 1)));
        assert_eq!(seen.last(), Some(&(SlotState::Idle, 1)));
    }

    #[tokio::test]
    async fn failed_request_event_carries_attempt_count() {
        let store = Arc::new(ConflictingStore::default());
        let config = CoordinatorConfig::default().with_max_resolve_retries(3);
        let coordinator = SnapshotCoordinator::new(store, config);
        let mut events = coordinator.subscribe();

        coordinator.load(slot("p1")).await.unwrap_err();
        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some((event.state, event.retry));
        }
        assert_eq!(last, Some((SlotState::Failed, 3)));
    }

    #[tokio::test]
    async fn endless_conflicts_stop_after_max_retries() {
        let store = Arc::new(ConflictingStore::default());
        let config = CoordinatorConfig::default().with_max_resolve_retries(5);
        let coordinator = SnapshotCoordinator::new(store.clone(), config);

        let err = coordinator.load(slot("p1")).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::ConflictUnresolved { attempts: 5, .. }
        ));
        assert_eq!(store.resolves.load(Ordering::SeqCst), 5);
        assert_eq!(store.discards.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_open(&slot("p1")));
    }

    #[tokio::test]
    async fn default_retry_bound_is_fifty() {
        let store = Arc::new(ConflictingStore::default());
        let coordinator = SnapshotCoordinator::new(store.clone(), CoordinatorConfig::default());

        let err = coordinator
            .save(slot("p1"), &SaveGame::new(), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict_unresolved());
        assert_eq!(store.resolves.load(Ordering::SeqCst), 50);
        assert_eq!(store.discards.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_error_during_resolve_closes_slot() {
        let store = Arc::new(ConflictingStore {
            fail_resolve: true,
            ..Default::default()
        });
        let coordinator = SnapshotCoordinator::new(store.clone(), CoordinatorConfig::default());

        let err = coordinator.load(slot("p1")).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Store(StoreError::Unavailable(_))
        ));
        assert_eq!(store.resolves.load(Ordering::SeqCst), 1);
        assert_eq!(store.discards.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn save_over_conflict_merges_everything() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        coordinator
            .save(slot("p1"), &save_of(&[((1, 1), 3)]), None)
            .await
            .unwrap();
        store
            .push_divergent(
                &slot("p1"),
                save_of(&[((1, 1), 2), ((1, 2), 4)]).serialize(),
                MetadataChange::default(),
            )
            .unwrap();

        let meta = coordinator
            .save(slot("p1"), &save_of(&[((1, 1), 3), ((2, 1), 1)]), None)
            .await
            .unwrap();

        let expected = save_of(&[((1, 1), 3), ((1, 2), 4), ((2, 1), 1)]);
        assert_eq!(coordinator.load(slot("p1")).await.unwrap(), expected);
        assert_eq!(meta.progress_value, Some(8));
        assert!(meta.description.starts_with("Modified data at: "));
        assert!(!store.record(&slot("p1")).unwrap().unwrap().has_conflict());
    }

    #[tokio::test]
    async fn load_of_new_slot_is_empty() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);

        let save = coordinator.load(slot("new-slot")).await.unwrap();
        assert!(save.is_empty());
        assert_eq!(save.stars_for(1, 1), 0);
        assert!(store.is_empty());
        assert!(!store.is_open(&slot("new-slot")));
    }

    #[tokio::test]
    async fn load_of_missing_slot_without_create_fails() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);

        let err = coordinator
            .load(OpenTarget::existing(slot("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Store(StoreError::NotFound(_))));
        assert!(!coordinator.is_open(&slot("nope")));
    }

    #[tokio::test]
    async fn corrupt_payload_is_reported_without_mutation() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        store
            .push_divergent(&slot("p1"), b"garbage".to_vec(), MetadataChange::default())
            .unwrap();
        let before = store.record(&slot("p1")).unwrap();

        let err = coordinator.load(slot("p1")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::CorruptPayload { .. }));
        assert_eq!(store.record(&slot("p1")).unwrap(), before);
        assert!(!store.is_open(&slot("p1")));
    }

    #[tokio::test]
    async fn save_replaces_corrupt_contents() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        store
            .push_divergent(&slot("p1"), b"garbage".to_vec(), MetadataChange::default())
            .unwrap();

        let fresh = save_of(&[((3, 3), 2)]);
        coordinator.save(slot("p1"), &fresh, None).await.unwrap();
        assert_eq!(coordinator.load(slot("p1")).await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn explicit_metadata_wins_over_defaults() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        let change = MetadataChange::new()
            .with_description("chapter two")
            .with_played_time_ms(90_000);

        let meta = coordinator
            .save(slot("p1"), &save_of(&[((1, 1), 2)]), Some(change))
            .await
            .unwrap();
        assert_eq!(meta.description, "chapter two");
        assert_eq!(meta.played_time_ms, Some(90_000));
        assert_eq!(meta.progress_value, Some(2));
    }

    #[tokio::test]
    async fn concurrent_saves_on_one_slot_all_land() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = Arc::new(coordinator(&store));

        let tasks: Vec<_> = (1..=10u32)
            .map(|level| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    let save = save_of(&[((1, level), (level % 3 + 1) as u8)]);
                    coordinator.save(slot("p1"), &save, None).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let merged = coordinator.load(slot("p1")).await.unwrap();
        assert_eq!(merged.len(), 10);
        for level in 1..=10u32 {
            assert_eq!(merged.stars_for(1, level), (level % 3 + 1) as u8);
        }
        assert_eq!(store.open_count(), 0);
    }

    async fn conflicted_store() -> Arc<InMemorySlotStore> {
        let store = Arc::new(InMemorySlotStore::new());
        coordinator(&store)
            .save(slot("p1"), &save_of(&[((1, 1), 1)]), None)
            .await
            .unwrap();
        store
            .push_divergent(
                &slot("p1"),
                save_of(&[((1, 1), 3)]).serialize(),
                MetadataChange::default(),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn presenter_choice_is_committed() {
        let store = conflicted_store().await;
        let (coordinator, prompts) =
            SnapshotCoordinator::from_config(store.clone(), CoordinatorConfig::manual());
        let mut prompts = prompts.unwrap();

        let ui = tokio::spawn(async move {
            let prompt = prompts.recv().await.unwrap();
            assert_eq!(prompt.retry, 1);
            assert_eq!(prompt.request, Request::Load);
            assert!(prompt.choose_current());
        });
        let loaded = coordinator.load(slot("p1")).await.unwrap();
        ui.await.unwrap();

        assert_eq!(loaded, save_of(&[((1, 1), 1)]));
        assert!(!store.record(&slot("p1")).unwrap().unwrap().has_conflict());
    }

    #[tokio::test]
    async fn second_request_waits_for_pending_prompt() {
        let store = conflicted_store().await;
        let (coordinator, prompts) =
            SnapshotCoordinator::from_config(store.clone(), CoordinatorConfig::manual());
        let coordinator = Arc::new(coordinator);
        let mut prompts = prompts.unwrap();

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.load(slot("p1")).await }
        });
        let prompt = prompts.recv().await.unwrap();

        let second = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.save(slot("p1"), &save_of(&[((2, 2), 2)]), None).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        assert!(coordinator.is_open(&slot("p1")));
        assert_eq!(store.open_count(), 1);

        assert!(prompt.choose_conflicting());
        assert_eq!(first.await.unwrap().unwrap(), save_of(&[((1, 1), 3)]));
        second.await.unwrap().unwrap();

        let merged = coordinator.load(slot("p1")).await.unwrap();
        assert_eq!(merged, save_of(&[((1, 1), 3), ((2, 2), 2)]));
    }

    #[tokio::test]
    async fn dropped_prompt_fails_request_and_closes_slot() {
        let store = conflicted_store().await;
        let (coordinator, prompts) =
            SnapshotCoordinator::from_config(store.clone(), CoordinatorConfig::manual());
        let mut prompts = prompts.unwrap();

        let ui = tokio::spawn(async move {
            drop(prompts.recv().await.unwrap());
        });
        let err = coordinator.load(slot("p1")).await.unwrap_err();
        ui.await.unwrap();

        assert!(matches!(err, CoordinatorError::PresenterCancelled { .. }));
        assert!(!store.is_open(&slot("p1")));
        assert!(store.record(&slot("p1")).unwrap().unwrap().has_conflict());
    }

    #[tokio::test]
    async fn abandoned_request_releases_slot() {
        let store = conflicted_store().await;
        let (coordinator, prompts) =
            SnapshotCoordinator::from_config(store.clone(), CoordinatorConfig::manual());
        let coordinator = Arc::new(coordinator);
        let mut prompts = prompts.unwrap();

        let request = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.load(slot("p1")).await }
        });
        let _prompt = prompts.recv().await.unwrap();
        assert!(store.is_open(&slot("p1")));

        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        coordinator.wait_for_closed(&slot("p1")).await;
        assert!(!store.is_open(&slot("p1")));
        assert!(!coordinator.is_open(&slot("p1")));
    }

    #[tokio::test]
    async fn identical_candidates_resolve_to_same_save() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        let save = save_of(&[((1, 1), 2), ((4, 7), 3)]);
        coordinator.save(slot("p1"), &save, None).await.unwrap();
        store
            .push_divergent(&slot("p1"), save.serialize(), MetadataChange::default())
            .unwrap();

        assert_eq!(coordinator.load(slot("p1")).await.unwrap(), save);
    }

    #[tokio::test]
    async fn every_queued_divergent_is_resolved() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        coordinator
            .save(slot("p1"), &save_of(&[((1, 1), 1)]), None)
            .await
            .unwrap();
        for level in 2..=4 {
            store
                .push_divergent(
                    &slot("p1"),
                    save_of(&[((1, level), 1)]).serialize(),
                    MetadataChange::default(),
                )
                .unwrap();
        }

        let loaded = coordinator.load(slot("p1")).await.unwrap();
        assert_eq!(loaded.len(), 4);
        assert!(!store.record(&slot("p1")).unwrap().unwrap().has_conflict());
    }

    #[tokio::test]
    async fn transitions_are_published() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        let mut events = coordinator.subscribe();

        coordinator.load(slot("p1")).await.unwrap();
        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.request, Request::Load);
            states.push(event.state);
        }
        assert_eq!(
            states,
            vec![
                SlotState::WaitingClosed,
                SlotState::Opening,
                SlotState::HaveRevision,
                SlotState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn delete_and_list() {
        let store = Arc::new(InMemorySlotStore::new());
        let coordinator = coordinator(&store);
        for name in ["save-1", "save-2", "other"] {
            coordinator
                .save(slot(name), &save_of(&[((1, 1), 1)]), None)
                .await
                .unwrap();
        }
        assert_eq!(coordinator.list("save-").await.unwrap().len(), 2);

        coordinator.delete(&slot("save-1")).await.unwrap();
        assert_eq!(coordinator.list("save-").await.unwrap().len(), 1);
        let err = coordinator.delete(&slot("save-1")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Store(StoreError::NotFound(_))));
    }
}
