//! # Repository Facade
//!
//! Typed save and load operations over a [`Store`], composing lifecycle
//! classification, audit stamping, cascades, batch commits and busy
//! tracking.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_persistence::prelude::*;
//!
//! let repo = Repository::open(&PersistenceConfig::default()).await?;
//!
//! let mut playlist = Playlist::new("Morning");
//! playlist.add_item("Intro", "/music/intro.flac", 61_000);
//! repo.save(&mut playlist).await?;
//!
//! let loaded: Option<Playlist> = repo.get_by_id(playlist.id()).await?;
//! ```
//!
//! ## Failure handling
//!
//! A root save that fails before its commit drops only what it staged itself;
//! changes left pending by earlier nested saves stay staged. A failed commit
//! drops the whole unit of work. Either way the working instance is restored
//! to its state before the call, so it can be saved again. A failed bulk save
//! restores the items that were not committed yet.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::identity::{PrincipalResolver, ProcessPrincipal, StaticPrincipal};
use bridge_traits::notification::{LogLevel, NotificationSink};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::{BatchCommitPolicy, PersistenceConfig, DEFAULT_BATCH_THRESHOLD};
use core_runtime::events::{CoreEvent, EventBus, PersistenceEvent};
use core_runtime::logging::mask_principal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::AuditStamper;
use crate::batch::{BatchCommitController, BatchReport};
use crate::busy::BusyGuard;
use crate::db::{create_pool, DatabaseConfig};
use crate::entity::Entity;
use crate::error::{PersistenceError, Result};
use crate::lifecycle::{classify, SaveAction, SaveScope};
use crate::models::{DomainRecord, MediaPlayer, Tracked};
use crate::store::{CommitSummary, RecordQuery, SqliteStore, Store};

const LOG_TARGET: &str = "core_persistence::repository";

/// Persistence facade owning one store
pub struct Repository<S: Store> {
    store: S,
    stamper: AuditStamper,
    notifier: Option<Arc<dyn NotificationSink>>,
    events: Option<EventBus>,
    busy: BusyGuard,
    batch: BatchCommitController,
}

impl Repository<SqliteStore> {
    /// Opens the configured database, runs migrations and wires the default
    /// collaborators: the system clock, and the configured principal or the
    /// process account.
    pub async fn open(config: &PersistenceConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::from_persistence_config(config)).await?;

        let principal: Arc<dyn PrincipalResolver> = match &config.principal {
            Some(principal) => Arc::new(StaticPrincipal::new(principal.clone())),
            None => Arc::new(ProcessPrincipal),
        };

        Repository::builder(SqliteStore::new(pool))
            .clock(Arc::new(SystemClock))
            .principal(principal)
            .config(config)
            .event_bus(EventBus::new(config.event_buffer_size))
            .build()
    }
}

impl<S: Store> Repository<S> {
    pub fn builder(store: S) -> RepositoryBuilder<S> {
        RepositoryBuilder::new(store)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Busy state shared by every save on this repository
    pub fn busy_guard(&self) -> &BusyGuard {
        &self.busy
    }

    pub fn events(&self) -> Option<&EventBus> {
        self.events.as_ref()
    }

    pub fn batch_controller(&self) -> &BatchCommitController {
        &self.batch
    }

    // ------------------------------------------------------------------
    // Saves
    // ------------------------------------------------------------------

    /// Saves `entity` and its owned children, then commits.
    pub async fn save<E: Entity>(&self, entity: &mut E) -> Result<SaveAction> {
        self.save_cancellable(entity, &CancellationToken::new()).await
    }

    /// [`save`](Self::save) that stops before the next staging step or the
    /// commit once `cancel` fires.
    pub async fn save_cancellable<E: Entity>(
        &self,
        entity: &mut E,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        let operation_id = Uuid::new_v4();
        let snapshot = entity.clone();

        match self.save_scoped(entity, SaveScope::Root, cancel).await {
            Ok(action) => {
                info!(
                    operation_id = %operation_id,
                    kind = %E::KIND,
                    id = entity.id(),
                    action = %action,
                    principal = %mask_principal(&self.stamper.principal_id()),
                    "Save committed"
                );

                self.notify_info(format!("Saved {} {} ({})", E::KIND, entity.id(), action))
                    .await;
                self.emit(PersistenceEvent::SaveCompleted {
                    entity_kind: E::KIND.to_string(),
                    entity_id: entity.id(),
                    action: action.to_string(),
                });

                Ok(action)
            }
            Err(e) => {
                *entity = snapshot;

                warn!(
                    operation_id = %operation_id,
                    kind = %E::KIND,
                    error = %e,
                    "Save failed"
                );

                self.report_failure(E::KIND.as_str(), &e).await;
                Err(e)
            }
        }
    }

    /// Stages `entity`, and commits when `scope` is [`SaveScope::Root`].
    ///
    /// Nested saves leave their changes pending until someone commits, and a
    /// failure leaves cleanup to the caller. A root save that fails before
    /// committing rolls the unit of work back to where it started. The working
    /// instance is not restored here; [`save`](Self::save) does that.
    pub async fn save_scoped<E: Entity>(
        &self,
        entity: &mut E,
        scope: SaveScope,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        let _busy = self.busy.acquire();

        if !scope.is_root() {
            return entity.persist(self, cancel).await;
        }

        let savepoint = self.store.savepoint().await;
        let staged = entity
            .persist(self, cancel)
            .await
            .and_then(|action| ensure_active(cancel).map(|()| action));

        let action = match staged {
            Ok(action) => action,
            Err(e) => {
                self.store.rollback_to(savepoint).await;
                return Err(e);
            }
        };

        // a failed commit has already dropped the unit of work
        self.store.commit().await?;
        Ok(action)
    }

    /// Saves a collection, committing every `batch_threshold` items.
    pub async fn save_all<E: Entity>(&self, entities: &mut [E]) -> Result<BatchReport> {
        self.save_all_cancellable(entities, &CancellationToken::new()).await
    }

    /// [`save_all`](Self::save_all) with cooperative cancellation.
    pub async fn save_all_cancellable<E: Entity>(
        &self,
        entities: &mut [E],
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        self.save_all_scoped(entities, SaveScope::Root, cancel).await
    }

    /// Bulk counterpart of [`save_scoped`](Self::save_scoped).
    ///
    /// Batch boundaries and a trailing partial batch commit in both scopes; a
    /// root bulk save also commits at the end when nothing is pending.
    /// Batches committed before a failure stay committed, and the items they
    /// hold keep their persisted state.
    pub async fn save_all_scoped<E: Entity>(
        &self,
        entities: &mut [E],
        scope: SaveScope,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let _busy = self.busy.acquire();
        let snapshot = entities.to_vec();
        let savepoint = self.store.savepoint().await;

        let staged = AtomicUsize::new(0);
        let committed = AtomicUsize::new(0);
        let commit_failed = AtomicBool::new(false);
        let (repo, staged_ref, committed_ref, failed_ref) =
            (self, &staged, &committed, &commit_failed);

        let result = self
            .batch
            .save_batch(
                entities,
                scope,
                move |entity, scope| {
                    staged_ref.fetch_add(1, Ordering::SeqCst);
                    repo.save_scoped(entity, scope, cancel)
                },
                move || async move {
                    ensure_active(cancel)?;
                    let summary = match repo.store.commit().await {
                        Ok(summary) => summary,
                        Err(e) => {
                            failed_ref.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    };
                    committed_ref.store(staged_ref.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok::<CommitSummary, PersistenceError>(summary)
                },
            )
            .await;

        match result {
            Ok(report) => {
                self.notify_info(format!(
                    "Saved {} {} records in {} commits",
                    report.items,
                    E::KIND,
                    report.commits
                ))
                .await;
                self.emit(PersistenceEvent::BatchCommitted {
                    entity_kind: E::KIND.to_string(),
                    items: report.items,
                    commits: report.commits,
                });
                Ok(report)
            }
            Err(e) => {
                let committed = committed.load(Ordering::SeqCst);

                // a failed commit has already dropped the unit of work
                if !commit_failed.load(Ordering::SeqCst) {
                    if committed == 0 {
                        self.store.rollback_to(savepoint).await;
                    } else {
                        self.store.discard_changes().await;
                    }
                }

                for (entity, original) in entities.iter_mut().zip(snapshot).skip(committed) {
                    *entity = original;
                }

                warn!(
                    kind = %E::KIND,
                    committed,
                    error = %e,
                    "Bulk save failed"
                );

                self.report_failure(E::KIND.as_str(), &e).await;
                Err(e)
            }
        }
    }

    /// Commits everything staged by nested saves
    pub async fn commit(&self) -> Result<CommitSummary> {
        self.store.commit().await
    }

    /// Drops everything staged since the last commit
    pub async fn discard_pending_changes(&self) {
        self.store.discard_changes().await;
    }

    /// Releases the store; the repository is unusable afterwards
    pub async fn dispose(&self) -> Result<()> {
        self.store.dispose().await
    }

    // ------------------------------------------------------------------
    // Loads
    // ------------------------------------------------------------------

    /// Loads one entity with its children; `None` when absent
    pub async fn get_by_id<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        match self.store.find_by_id(E::KIND, id).await? {
            Some(record) => Ok(Some(E::hydrate(self, record).await?)),
            None => Ok(None),
        }
    }

    /// Loads every entity of a kind with its children
    pub async fn get_all<E: Entity>(&self) -> Result<Vec<E>> {
        let records = self.store.query(RecordQuery::All(E::KIND)).await?;

        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            entities.push(E::hydrate(self, record).await?);
        }

        Ok(entities)
    }

    /// The player flagged main, with its playlist
    pub async fn get_main_media_player(&self) -> Result<Option<MediaPlayer>> {
        let records = self
            .store
            .query(RecordQuery::MediaPlayers { is_main: true })
            .await?;

        if records.len() > 1 {
            warn!(
                count = records.len(),
                "Several media players are flagged main, using the lowest id"
            );
        }

        match records.into_iter().next() {
            Some(record) => Ok(Some(MediaPlayer::hydrate(self, record).await?)),
            None => Ok(None),
        }
    }

    /// Every player not flagged main, with its playlist
    pub async fn get_all_optional_media_players(&self) -> Result<Vec<MediaPlayer>> {
        let records = self
            .store
            .query(RecordQuery::MediaPlayers { is_main: false })
            .await?;

        let mut players = Vec::with_capacity(records.len());
        for record in records {
            players.push(MediaPlayer::hydrate(self, record).await?);
        }

        Ok(players)
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    /// Classifies one tracked record and stages the matching store change.
    pub(crate) async fn stage<R: DomainRecord>(
        &self,
        tracked: &mut Tracked<R>,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        ensure_active(cancel)?;

        let action = classify(tracked.flags());
        match action {
            SaveAction::Create => {
                tracked
                    .record
                    .validate()
                    .map_err(|message| PersistenceError::invalid(R::KIND, message))?;

                self.stamper.stamp(&mut tracked.record, SaveAction::Create);
                let id = self.store.add(tracked.record.clone().into_record()).await?;
                tracked.record.set_id(id);
                tracked.mark_persisted();
            }
            SaveAction::Update => {
                tracked
                    .record
                    .validate()
                    .map_err(|message| PersistenceError::invalid(R::KIND, message))?;

                let existing = self
                    .store
                    .find_by_id(R::KIND, tracked.id())
                    .await?
                    .ok_or_else(|| PersistenceError::NotFound {
                        entity_type: R::KIND.to_string(),
                        id: tracked.id(),
                    })?;

                // creation stamps are write-once
                let stored = existing.audit();
                let audit = tracked.record.audit_mut();
                audit.created_by = stored.created_by.clone();
                audit.created_on = stored.created_on;

                self.stamper.stamp(&mut tracked.record, SaveAction::Update);
                self.store
                    .copy_current_values(&existing, tracked.record.clone().into_record())
                    .await?;
            }
            SaveAction::Delete => {
                match self.store.find_by_id(R::KIND, tracked.id()).await? {
                    Some(existing) => self.store.remove(&existing).await?,
                    None => debug!(
                        kind = %R::KIND,
                        id = tracked.id(),
                        "Record already absent, nothing to delete"
                    ),
                }
            }
        }

        debug!(kind = %R::KIND, id = tracked.id(), action = %action, "Staged record");
        Ok(action)
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    async fn notify_info(&self, message: String) {
        let Some(sink) = &self.notifier else {
            return;
        };
        if sink.min_level() > LogLevel::Info {
            return;
        }

        if let Err(e) = sink.info(LOG_TARGET, &message).await {
            warn!(error = %e, "Notification sink rejected entry");
        }
    }

    async fn report_failure(&self, kind: &str, error: &PersistenceError) {
        if let Some(sink) = &self.notifier {
            let message = format!("Saving {} failed", kind);
            if let Err(e) = sink.error(LOG_TARGET, &message, &error.to_string()).await {
                warn!(error = %e, "Notification sink rejected entry");
            }
        }

        self.emit(PersistenceEvent::SaveFailed {
            entity_kind: kind.to_string(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: PersistenceEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Persistence(event)).ok();
        }
    }
}

impl<S: Store> fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("busy", &self.busy)
            .field("batch", &self.batch)
            .field("has_notifier", &self.notifier.is_some())
            .field("has_events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PersistenceError::Cancelled);
    }
    Ok(())
}

/// Builder for [`Repository`]
///
/// Clock and principal resolver are required; everything else is optional.
pub struct RepositoryBuilder<S: Store> {
    store: S,
    clock: Option<Arc<dyn Clock>>,
    principal: Option<Arc<dyn PrincipalResolver>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    events: Option<EventBus>,
    batch_threshold: usize,
    commit_policy: BatchCommitPolicy,
}

impl<S: Store> RepositoryBuilder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: None,
            principal: None,
            notifier: None,
            events: None,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            commit_policy: BatchCommitPolicy::default(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn principal(mut self, principal: Arc<dyn PrincipalResolver>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    /// Publishes busy transitions and save outcomes on `bus`
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    pub fn commit_policy(mut self, policy: BatchCommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// Takes the batch settings from `config`
    pub fn config(self, config: &PersistenceConfig) -> Self {
        self.batch_threshold(config.batch_threshold)
            .commit_policy(config.commit_policy)
    }

    /// # Errors
    ///
    /// [`PersistenceError::CapabilityMissing`] without a clock or principal
    /// resolver, [`PersistenceError::InvalidInput`] for a zero batch threshold.
    pub fn build(self) -> Result<Repository<S>> {
        let clock = self
            .clock
            .ok_or_else(|| PersistenceError::CapabilityMissing {
                capability: "Clock".to_string(),
                message: "A clock is required to stamp audit fields".to_string(),
            })?;

        let principal = self
            .principal
            .ok_or_else(|| PersistenceError::CapabilityMissing {
                capability: "PrincipalResolver".to_string(),
                message: "A principal resolver is required to stamp audit fields".to_string(),
            })?;

        let batch = BatchCommitController::try_new(self.batch_threshold, self.commit_policy)?;

        let busy = BusyGuard::new();
        if let Some(bus) = &self.events {
            let bus = bus.clone();
            busy.on_change(move |busy| {
                bus.emit(CoreEvent::Persistence(PersistenceEvent::BusyChanged { busy }))
                    .ok();
            });
        }

        Ok(Repository {
            store: self.store,
            stamper: AuditStamper::new(clock, principal),
            notifier: self.notifier,
            events: self.events,
            busy,
            batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, Playlist, PlaylistRecord, Record};
    use crate::store::RecordQuery;
    use bridge_traits::time::ManualClock;
    use chrono::{TimeZone, Utc};
    use mockall::mock;

    mock! {
        pub RecordStore {}

        #[async_trait::async_trait]
        impl Store for RecordStore {
            type Savepoint = ();

            async fn find_by_id(&self, kind: EntityKind, id: i64) -> Result<Option<Record>>;
            async fn query(&self, query: RecordQuery) -> Result<Vec<Record>>;
            async fn add(&self, record: Record) -> Result<i64>;
            async fn remove(&self, record: &Record) -> Result<()>;
            async fn copy_current_values(&self, target: &Record, source: Record) -> Result<()>;
            async fn commit(&self) -> Result<CommitSummary>;
            async fn pending_changes(&self) -> usize;
            async fn discard_changes(&self);
            async fn savepoint(&self);
            async fn rollback_to(&self, savepoint: ());
            async fn dispose(&self) -> Result<()>;
        }
    }

    type MockStore = MockRecordStore;

    fn builder(store: MockStore) -> RepositoryBuilder<MockStore> {
        Repository::builder(store)
            .clock(Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            )))
            .principal(Arc::new(StaticPrincipal::new("tester")))
    }

    #[test]
    fn test_missing_clock_fails_fast() {
        let result = Repository::builder(MockStore::new())
            .principal(Arc::new(StaticPrincipal::new("tester")))
            .build();

        assert!(matches!(
            result,
            Err(PersistenceError::CapabilityMissing { ref capability, .. }) if capability == "Clock"
        ));
    }

    #[test]
    fn test_missing_principal_fails_fast() {
        let result = Repository::builder(MockStore::new())
            .clock(Arc::new(SystemClock))
            .build();

        assert!(matches!(
            result,
            Err(PersistenceError::CapabilityMissing { ref capability, .. })
                if capability == "PrincipalResolver"
        ));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = builder(MockStore::new()).batch_threshold(0).build();
        assert!(matches!(result, Err(PersistenceError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_commit_failure_propagates_and_restores_entity() {
        let mut store = MockStore::new();
        store.expect_savepoint().times(1).returning(|| ());
        store.expect_add().times(1).returning(|_| Ok(41));
        store
            .expect_commit()
            .times(1)
            .returning(|| Err(PersistenceError::Runtime("disk full".to_string())));
        store.expect_rollback_to().never();
        store.expect_discard_changes().never();

        let repo = builder(store).build().unwrap();
        let mut playlist = Playlist::new("Unsaved");

        let result = repo.save(&mut playlist).await;

        assert!(matches!(result, Err(PersistenceError::Runtime(_))));
        assert!(playlist.is_new());
        assert_eq!(playlist.id(), 0);
        assert!(playlist.record().audit.created_on.is_none());
        assert!(!repo.busy_guard().is_busy());
    }

    #[tokio::test]
    async fn test_update_of_absent_record_is_not_found() {
        let mut store = MockStore::new();
        store.expect_savepoint().returning(|| ());
        store.expect_find_by_id().returning(|_, _| Ok(None));
        store.expect_rollback_to().times(1).returning(|_| ());
        store.expect_commit().never();

        let repo = builder(store).build().unwrap();
        let mut record = PlaylistRecord::new("Ghost");
        record.id = 77;
        let mut playlist = Playlist::loaded(record, Vec::new());

        let result = repo.save(&mut playlist).await;
        assert!(matches!(
            result,
            Err(PersistenceError::NotFound { id: 77, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_of_absent_record_is_noop() {
        let mut store = MockStore::new();
        store.expect_savepoint().returning(|| ());
        store.expect_find_by_id().returning(|_, _| Ok(None));
        store.expect_remove().never();
        store
            .expect_commit()
            .times(1)
            .returning(|| Ok(CommitSummary::default()));

        let repo = builder(store).build().unwrap();
        let mut record = PlaylistRecord::new("Gone");
        record.id = 5;
        let mut playlist = Playlist::loaded(record, Vec::new());
        playlist.mark_deleted();

        assert_eq!(repo.save(&mut playlist).await.unwrap(), SaveAction::Delete);
    }

    #[tokio::test]
    async fn test_cancelled_save_never_reaches_store() {
        let mut store = MockStore::new();
        store.expect_savepoint().returning(|| ());
        store.expect_add().never();
        store.expect_commit().never();
        store.expect_rollback_to().times(1).returning(|_| ());
        store.expect_discard_changes().never();

        let repo = builder(store).build().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut playlist = Playlist::new("Cancelled");
        let result = repo.save_cancellable(&mut playlist, &cancel).await;

        assert!(matches!(result, Err(PersistenceError::Cancelled)));
        assert!(playlist.is_new());
    }

    struct RejectingSink;

    #[async_trait::async_trait]
    impl NotificationSink for RejectingSink {
        async fn notify(
            &self,
            _entry: bridge_traits::notification::LogEntry,
        ) -> bridge_traits::error::Result<()> {
            Err(bridge_traits::error::BridgeError::Rejected(
                "host is shutting down".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_sink_rejection_does_not_fail_save() {
        let mut store = MockStore::new();
        store.expect_savepoint().returning(|| ());
        store.expect_add().times(1).returning(|_| Ok(3));
        store
            .expect_commit()
            .times(1)
            .returning(|| Ok(CommitSummary::default()));

        let repo = builder(store)
            .notification_sink(Arc::new(RejectingSink))
            .build()
            .unwrap();
        let mut playlist = Playlist::new("Quiet");

        assert_eq!(repo.save(&mut playlist).await.unwrap(), SaveAction::Create);
        assert_eq!(playlist.id(), 3);
    }

    #[tokio::test]
    async fn test_invalid_record_rejected_before_staging() {
        let mut store = MockStore::new();
        store.expect_savepoint().returning(|| ());
        store.expect_add().never();
        store.expect_rollback_to().times(1).returning(|_| ());

        let repo = builder(store).build().unwrap();
        let mut playlist = Playlist::new("   ");

        let result = repo.save(&mut playlist).await;
        assert!(matches!(
            result,
            Err(PersistenceError::InvalidInput { ref field, .. }) if field == "playlist"
        ));
    }
}
