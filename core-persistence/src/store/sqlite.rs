//! SQLite unit-of-work store
//!
//! Changes are staged in memory and written in one sqlx transaction on
//! [`Store::commit`]. Keys are handed out when a record is staged so children
//! can reference a parent created in the same unit of work; the schema defers
//! foreign key checks to commit time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, Result};
use crate::models::{
    AudioDeviceRecord, EntityKind, MediaItemRecord, MediaPlayerRecord, PlaylistRecord, Record,
};
use crate::store::{CommitSummary, RecordQuery, Store};

#[derive(Debug, Clone)]
enum StagedChange {
    Insert(Record),
    Update(Record),
    Delete { kind: EntityKind, id: i64 },
}

impl StagedChange {
    fn key(&self) -> (EntityKind, i64) {
        match self {
            StagedChange::Insert(record) | StagedChange::Update(record) => {
                (record.kind(), record.id())
            }
            StagedChange::Delete { kind, id } => (*kind, *id),
        }
    }
}

/// Staged changes, at most one per `(kind, id)`
#[derive(Debug, Default, Clone)]
struct UnitOfWork {
    changes: Vec<StagedChange>,
    last_ids: HashMap<EntityKind, i64>,
}

impl UnitOfWork {
    fn position(&self, kind: EntityKind, id: i64) -> Option<usize> {
        self.changes
            .iter()
            .position(|change| change.key() == (kind, id))
    }

    /// `Some(None)` when the record is staged for deletion, `None` when the
    /// unit of work does not touch it.
    fn overlay(&self, kind: EntityKind, id: i64) -> Option<Option<Record>> {
        self.position(kind, id).map(|index| match &self.changes[index] {
            StagedChange::Insert(record) | StagedChange::Update(record) => Some(record.clone()),
            StagedChange::Delete { .. } => None,
        })
    }

    fn reset(&mut self) -> Vec<StagedChange> {
        self.last_ids.clear();
        std::mem::take(&mut self.changes)
    }
}

/// Pending unit of work of a [`SqliteStore`], key allocator included
#[derive(Debug, Clone)]
pub struct SqliteSavepoint {
    unit_of_work: UnitOfWork,
}

impl SqliteSavepoint {
    pub fn staged_changes(&self) -> usize {
        self.unit_of_work.changes.len()
    }
}

/// [`Store`] over an sqlx SQLite pool
pub struct SqliteStore {
    pool: SqlitePool,
    unit_of_work: Mutex<UnitOfWork>,
    disposed: AtomicBool,
}

impl SqliteStore {
    /// Wraps a pool whose schema is already migrated
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            unit_of_work: Mutex::new(UnitOfWork::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(PersistenceError::Disposed);
        }
        Ok(())
    }

    async fn allocate_id(&self, unit_of_work: &mut UnitOfWork, kind: EntityKind) -> Result<i64> {
        let next = match unit_of_work.last_ids.get(&kind) {
            Some(last) => last + 1,
            None => {
                let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", kind.table());
                let max: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
                max + 1
            }
        };

        unit_of_work.last_ids.insert(kind, next);
        Ok(next)
    }

    async fn fetch_by_id(&self, kind: EntityKind, id: i64) -> Result<Option<Record>> {
        let record = match kind {
            EntityKind::Playlist => {
                sqlx::query_as::<_, PlaylistRecord>("SELECT * FROM playlists WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Record::Playlist)
            }
            EntityKind::MediaItem => {
                sqlx::query_as::<_, MediaItemRecord>("SELECT * FROM media_items WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Record::MediaItem)
            }
            EntityKind::MediaPlayer => {
                sqlx::query_as::<_, MediaPlayerRecord>("SELECT * FROM media_players WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Record::MediaPlayer)
            }
            EntityKind::AudioDevice => {
                sqlx::query_as::<_, AudioDeviceRecord>("SELECT * FROM audio_devices WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Record::AudioDevice)
            }
        };

        Ok(record)
    }

    async fn fetch_query(&self, query: RecordQuery) -> Result<Vec<Record>> {
        let records = match query {
            RecordQuery::All(EntityKind::Playlist) => {
                sqlx::query_as::<_, PlaylistRecord>("SELECT * FROM playlists ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
                    .into_iter()
                    .map(Record::Playlist)
                    .collect()
            }
            RecordQuery::All(EntityKind::MediaItem) => sqlx::query_as::<_, MediaItemRecord>(
                "SELECT * FROM media_items ORDER BY playlist_id, sequence, id",
            )
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Record::MediaItem)
            .collect(),
            RecordQuery::All(EntityKind::MediaPlayer) => {
                sqlx::query_as::<_, MediaPlayerRecord>("SELECT * FROM media_players ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
                    .into_iter()
                    .map(Record::MediaPlayer)
                    .collect()
            }
            RecordQuery::All(EntityKind::AudioDevice) => {
                sqlx::query_as::<_, AudioDeviceRecord>("SELECT * FROM audio_devices ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
                    .into_iter()
                    .map(Record::AudioDevice)
                    .collect()
            }
            RecordQuery::MediaItemsOf { playlist_id } => sqlx::query_as::<_, MediaItemRecord>(
                "SELECT * FROM media_items WHERE playlist_id = ? ORDER BY sequence, id",
            )
            .bind(playlist_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Record::MediaItem)
            .collect(),
            RecordQuery::MediaPlayers { is_main } => sqlx::query_as::<_, MediaPlayerRecord>(
                "SELECT * FROM media_players WHERE is_main = ? ORDER BY id",
            )
            .bind(is_main)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Record::MediaPlayer)
            .collect(),
        };

        Ok(records)
    }

    async fn apply(&self, changes: &[StagedChange]) -> Result<CommitSummary> {
        let mut tx = self.pool.begin().await?;
        let mut summary = CommitSummary::default();

        for change in changes {
            apply_change(&mut tx, change, &mut summary).await?;
        }

        tx.commit().await?;
        Ok(summary)
    }
}

#[async_trait]
impl Store for SqliteStore {
    type Savepoint = SqliteSavepoint;

    async fn find_by_id(&self, kind: EntityKind, id: i64) -> Result<Option<Record>> {
        self.ensure_open()?;
        let unit_of_work = self.unit_of_work.lock().await;

        if let Some(staged) = unit_of_work.overlay(kind, id) {
            return Ok(staged);
        }

        self.fetch_by_id(kind, id).await
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let unit_of_work = self.unit_of_work.lock().await;
        let mut records = self.fetch_query(query).await?;

        let kind = query.kind();
        for change in &unit_of_work.changes {
            let (change_kind, id) = change.key();
            if change_kind != kind {
                continue;
            }

            records.retain(|record| record.id() != id);

            if let StagedChange::Insert(record) | StagedChange::Update(record) = change {
                if query.matches(record) {
                    records.push(record.clone());
                }
            }
        }

        query.sort(&mut records);
        Ok(records)
    }

    async fn add(&self, mut record: Record) -> Result<i64> {
        self.ensure_open()?;
        let mut unit_of_work = self.unit_of_work.lock().await;
        let kind = record.kind();

        if record.id() == 0 {
            let id = self.allocate_id(&mut unit_of_work, kind).await?;
            record.set_id(id);
        }

        let id = record.id();
        match unit_of_work.position(kind, id) {
            Some(index) => match unit_of_work.changes[index] {
                StagedChange::Delete { .. } => {
                    unit_of_work.changes[index] = StagedChange::Update(record);
                }
                _ => {
                    return Err(PersistenceError::invalid(
                        kind,
                        format!("record {} is already staged", id),
                    ))
                }
            },
            None => unit_of_work.changes.push(StagedChange::Insert(record)),
        }

        debug!(kind = %kind, id, "Staged insert");
        Ok(id)
    }

    async fn remove(&self, record: &Record) -> Result<()> {
        self.ensure_open()?;
        let mut unit_of_work = self.unit_of_work.lock().await;
        let (kind, id) = (record.kind(), record.id());

        match unit_of_work.position(kind, id) {
            Some(index) => match unit_of_work.changes[index] {
                StagedChange::Insert(_) => {
                    unit_of_work.changes.remove(index);
                }
                StagedChange::Update(_) => {
                    unit_of_work.changes[index] = StagedChange::Delete { kind, id };
                }
                StagedChange::Delete { .. } => {}
            },
            None => unit_of_work.changes.push(StagedChange::Delete { kind, id }),
        }

        debug!(kind = %kind, id, "Staged delete");
        Ok(())
    }

    async fn copy_current_values(&self, target: &Record, source: Record) -> Result<()> {
        self.ensure_open()?;

        if target.kind() != source.kind() {
            return Err(PersistenceError::KindMismatch {
                expected: target.kind(),
                found: source.kind(),
            });
        }

        let (kind, id) = (target.kind(), target.id());
        if source.id() != id {
            return Err(PersistenceError::invalid(
                kind,
                format!("cannot copy values of record {} into {}", source.id(), id),
            ));
        }

        let mut unit_of_work = self.unit_of_work.lock().await;
        match unit_of_work.position(kind, id) {
            Some(index) => match unit_of_work.changes[index] {
                StagedChange::Insert(_) => {
                    unit_of_work.changes[index] = StagedChange::Insert(source);
                }
                StagedChange::Update(_) => {
                    unit_of_work.changes[index] = StagedChange::Update(source);
                }
                StagedChange::Delete { .. } => {
                    return Err(PersistenceError::NotFound {
                        entity_type: kind.to_string(),
                        id,
                    })
                }
            },
            None => unit_of_work.changes.push(StagedChange::Update(source)),
        }

        debug!(kind = %kind, id, "Staged update");
        Ok(())
    }

    async fn commit(&self) -> Result<CommitSummary> {
        self.ensure_open()?;
        let mut unit_of_work = self.unit_of_work.lock().await;
        let changes = unit_of_work.reset();

        if changes.is_empty() {
            debug!("Nothing to commit");
            return Ok(CommitSummary::default());
        }

        match self.apply(&changes).await {
            Ok(summary) => {
                info!(
                    inserted = summary.inserted,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "Unit of work committed"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    discarded = changes.len(),
                    "Commit failed, unit of work rolled back"
                );
                Err(e)
            }
        }
    }

    async fn pending_changes(&self) -> usize {
        self.unit_of_work.lock().await.changes.len()
    }

    async fn discard_changes(&self) {
        let discarded = self.unit_of_work.lock().await.reset();
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "Discarded staged changes");
        }
    }

    async fn savepoint(&self) -> SqliteSavepoint {
        SqliteSavepoint {
            unit_of_work: self.unit_of_work.lock().await.clone(),
        }
    }

    async fn rollback_to(&self, savepoint: SqliteSavepoint) {
        let mut unit_of_work = self.unit_of_work.lock().await;
        let before = unit_of_work.changes.len();
        *unit_of_work = savepoint.unit_of_work;
        debug!(
            before,
            after = unit_of_work.changes.len(),
            "Rolled back to savepoint"
        );
    }

    async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let discarded = self.unit_of_work.lock().await.reset();
        if !discarded.is_empty() {
            warn!(
                discarded = discarded.len(),
                "Store disposed with uncommitted changes"
            );
        }

        self.pool.close().await;
        info!("Store disposed");
        Ok(())
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

async fn apply_change(
    conn: &mut SqliteConnection,
    change: &StagedChange,
    summary: &mut CommitSummary,
) -> Result<()> {
    match change {
        StagedChange::Insert(record) => {
            insert_record(conn, record).await?;
            summary.inserted += 1;
        }
        StagedChange::Update(record) => {
            if update_record(conn, record).await? == 0 {
                return Err(PersistenceError::NotFound {
                    entity_type: record.kind().to_string(),
                    id: record.id(),
                });
            }
            summary.updated += 1;
        }
        StagedChange::Delete { kind, id } => {
            let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
            sqlx::query(&sql).bind(*id).execute(&mut *conn).await?;
            summary.deleted += 1;
        }
    }

    Ok(())
}

async fn insert_record(conn: &mut SqliteConnection, record: &Record) -> Result<()> {
    match record {
        Record::Playlist(r) => {
            sqlx::query(
                r#"
                INSERT INTO playlists (
                    id, name, description, created_by, created_on, updated_by, updated_on
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.id)
            .bind(&r.name)
            .bind(&r.description)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .execute(&mut *conn)
            .await?
        }
        Record::MediaItem(r) => {
            sqlx::query(
                r#"
                INSERT INTO media_items (
                    id, playlist_id, title, location, duration_ms, sequence,
                    created_by, created_on, updated_by, updated_on
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.id)
            .bind(r.playlist_id)
            .bind(&r.title)
            .bind(&r.location)
            .bind(r.duration_ms)
            .bind(r.sequence)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .execute(&mut *conn)
            .await?
        }
        Record::MediaPlayer(r) => {
            sqlx::query(
                r#"
                INSERT INTO media_players (
                    id, playlist_id, name, is_main, volume, is_muted, is_shuffled,
                    created_by, created_on, updated_by, updated_on
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.id)
            .bind(r.playlist_id)
            .bind(&r.name)
            .bind(r.is_main)
            .bind(r.volume)
            .bind(r.is_muted)
            .bind(r.is_shuffled)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .execute(&mut *conn)
            .await?
        }
        Record::AudioDevice(r) => {
            sqlx::query(
                r#"
                INSERT INTO audio_devices (
                    id, name, device_key, is_enabled,
                    created_by, created_on, updated_by, updated_on
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.id)
            .bind(&r.name)
            .bind(&r.device_key)
            .bind(r.is_enabled)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(())
}

/// Returns the number of rows touched
async fn update_record(conn: &mut SqliteConnection, record: &Record) -> Result<u64> {
    let result = match record {
        Record::Playlist(r) => {
            sqlx::query(
                r#"
                UPDATE playlists
                SET name = ?, description = ?,
                    created_by = ?, created_on = ?, updated_by = ?, updated_on = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.name)
            .bind(&r.description)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .bind(r.id)
            .execute(&mut *conn)
            .await?
        }
        Record::MediaItem(r) => {
            sqlx::query(
                r#"
                UPDATE media_items
                SET playlist_id = ?, title = ?, location = ?, duration_ms = ?, sequence = ?,
                    created_by = ?, created_on = ?, updated_by = ?, updated_on = ?
                WHERE id = ?
                "#,
            )
            .bind(r.playlist_id)
            .bind(&r.title)
            .bind(&r.location)
            .bind(r.duration_ms)
            .bind(r.sequence)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .bind(r.id)
            .execute(&mut *conn)
            .await?
        }
        Record::MediaPlayer(r) => {
            sqlx::query(
                r#"
                UPDATE media_players
                SET playlist_id = ?, name = ?, is_main = ?, volume = ?, is_muted = ?,
                    is_shuffled = ?,
                    created_by = ?, created_on = ?, updated_by = ?, updated_on = ?
                WHERE id = ?
                "#,
            )
            .bind(r.playlist_id)
            .bind(&r.name)
            .bind(r.is_main)
            .bind(r.volume)
            .bind(r.is_muted)
            .bind(r.is_shuffled)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .bind(r.id)
            .execute(&mut *conn)
            .await?
        }
        Record::AudioDevice(r) => {
            sqlx::query(
                r#"
                UPDATE audio_devices
                SET name = ?, device_key = ?, is_enabled = ?,
                    created_by = ?, created_on = ?, updated_by = ?, updated_on = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.name)
            .bind(&r.device_key)
            .bind(r.is_enabled)
            .bind(&r.audit.created_by)
            .bind(r.audit.created_on)
            .bind(&r.audit.updated_by)
            .bind(r.audit.updated_on)
            .bind(r.id)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::DomainRecord;

    async fn store() -> SqliteStore {
        SqliteStore::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_add_allocates_sequential_keys() {
        let store = store().await;

        let first = store
            .add(PlaylistRecord::new("One").into_record())
            .await
            .unwrap();
        let second = store
            .add(PlaylistRecord::new("Two").into_record())
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(store.pending_changes().await, 2);
    }

    #[tokio::test]
    async fn test_reads_see_staged_changes() {
        let store = store().await;
        let id = store
            .add(PlaylistRecord::new("Staged").into_record())
            .await
            .unwrap();

        let found = store.find_by_id(EntityKind::Playlist, id).await.unwrap();
        assert!(matches!(found, Some(Record::Playlist(ref p)) if p.name == "Staged"));

        let all = store
            .query(RecordQuery::All(EntityKind::Playlist))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        store.remove(&found.unwrap()).await.unwrap();
        assert_eq!(store.pending_changes().await, 0);
        assert!(store
            .find_by_id(EntityKind::Playlist, id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_applies_unit_of_work() {
        let store = store().await;
        let playlist_id = store
            .add(PlaylistRecord::new("Parent").into_record())
            .await
            .unwrap();
        store
            .add(MediaItemRecord::new(playlist_id, "Child", "/c.ogg", 5).into_record())
            .await
            .unwrap();

        let summary = store.commit().await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(store.pending_changes().await, 0);

        let items = store
            .query(RecordQuery::MediaItemsOf { playlist_id })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        let mut renamed = PlaylistRecord::from_record(
            store
                .find_by_id(EntityKind::Playlist, playlist_id)
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        let target = renamed.clone().into_record();
        renamed.name = "Renamed".to_string();
        store
            .copy_current_values(&target, renamed.into_record())
            .await
            .unwrap();

        let summary = store.commit().await.unwrap();
        assert_eq!(summary.updated, 1);

        let stored = store
            .fetch_by_id(EntityKind::Playlist, playlist_id)
            .await
            .unwrap();
        assert!(matches!(stored, Some(Record::Playlist(ref p)) if p.name == "Renamed"));
    }

    #[tokio::test]
    async fn test_failed_commit_discards_staged_changes() {
        let store = store().await;
        store
            .add(MediaItemRecord::new(999, "Orphan", "/o.mp3", 1).into_record())
            .await
            .unwrap();

        assert!(store.commit().await.is_err());
        assert_eq!(store.pending_changes().await, 0);

        let items = store
            .query(RecordQuery::All(EntityKind::MediaItem))
            .await
            .unwrap();
        assert!(items.is_empty());

        // allocator restarts from the table
        let id = store
            .add(PlaylistRecord::new("After").into_record())
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_rollback_to_savepoint_keeps_earlier_changes() {
        let store = store().await;
        let kept = store
            .add(PlaylistRecord::new("Kept").into_record())
            .await
            .unwrap();

        let savepoint = store.savepoint().await;
        assert_eq!(savepoint.staged_changes(), 1);

        let found = store
            .find_by_id(EntityKind::Playlist, kept)
            .await
            .unwrap()
            .unwrap();
        store.remove(&found).await.unwrap();
        let dropped = store
            .add(PlaylistRecord::new("Dropped").into_record())
            .await
            .unwrap();
        assert_eq!(dropped, 2);

        store.rollback_to(savepoint).await;
        assert_eq!(store.pending_changes().await, 1);
        assert!(store
            .find_by_id(EntityKind::Playlist, kept)
            .await
            .unwrap()
            .is_some());

        // allocator goes back with the changes
        let reused = store
            .add(PlaylistRecord::new("Again").into_record())
            .await
            .unwrap();
        assert_eq!(reused, 2);

        let summary = store.commit().await.unwrap();
        assert_eq!(summary.inserted, 2);
    }

    #[tokio::test]
    async fn test_copy_rejects_mismatched_records() {
        let store = store().await;
        let mut playlist = PlaylistRecord::new("P");
        playlist.id = 1;
        let mut other = playlist.clone();
        other.id = 2;

        let result = store
            .copy_current_values(&playlist.clone().into_record(), other.into_record())
            .await;
        assert!(matches!(result, Err(PersistenceError::InvalidInput { .. })));

        let device = AudioDeviceRecord::new("D", "k").into_record();
        let result = store
            .copy_current_values(&playlist.into_record(), device)
            .await;
        assert!(matches!(result, Err(PersistenceError::KindMismatch { .. })));
    }

    #[tokio::test]
    async fn test_disposed_store_rejects_operations() {
        let store = store().await;
        store.dispose().await.unwrap();

        let result = store.find_by_id(EntityKind::Playlist, 1).await;
        assert!(matches!(result, Err(PersistenceError::Disposed)));
        assert!(matches!(
            store.commit().await,
            Err(PersistenceError::Disposed)
        ));
        assert!(store.dispose().await.is_ok());
    }
}
