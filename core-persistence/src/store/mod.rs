//! Store contract
//!
//! A store keeps a pending unit of work: `add`, `remove` and
//! `copy_current_values` only stage changes, and `commit` applies everything
//! staged so far atomically. Reads see staged changes.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{EntityKind, Record};

pub use sqlite::{SqliteSavepoint, SqliteStore};

/// Record selection supported by every store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordQuery {
    /// Every record of a kind, ordered by id
    All(EntityKind),
    /// Items of one playlist, ordered by sequence then id
    MediaItemsOf { playlist_id: i64 },
    /// Players with the given main flag, ordered by id
    MediaPlayers { is_main: bool },
}

impl RecordQuery {
    pub fn kind(&self) -> EntityKind {
        match self {
            RecordQuery::All(kind) => *kind,
            RecordQuery::MediaItemsOf { .. } => EntityKind::MediaItem,
            RecordQuery::MediaPlayers { .. } => EntityKind::MediaPlayer,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (RecordQuery::All(kind), record) => record.kind() == *kind,
            (RecordQuery::MediaItemsOf { playlist_id }, Record::MediaItem(item)) => {
                item.playlist_id == *playlist_id
            }
            (RecordQuery::MediaPlayers { is_main }, Record::MediaPlayer(player)) => {
                player.is_main == *is_main
            }
            _ => false,
        }
    }

    /// Sorts `records` into the order this query returns
    pub fn sort(&self, records: &mut [Record]) {
        match self {
            RecordQuery::MediaItemsOf { .. } => records.sort_by_key(|record| match record {
                Record::MediaItem(item) => (item.sequence, item.id),
                other => (i64::MAX, other.id()),
            }),
            _ => records.sort_by_key(Record::id),
        }
    }
}

/// Rows written by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl CommitSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Unit-of-work storage backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Copy of the pending unit of work, see [`Store::savepoint`]
    type Savepoint: Send + 'static;

    /// Looks up a record, including staged changes
    async fn find_by_id(&self, kind: EntityKind, id: i64) -> Result<Option<Record>>;

    /// Runs a query, including staged changes
    async fn query(&self, query: RecordQuery) -> Result<Vec<Record>>;

    /// Stages an insert and returns the key assigned to the record
    async fn add(&self, record: Record) -> Result<i64>;

    /// Stages a delete
    async fn remove(&self, record: &Record) -> Result<()>;

    /// Stages an update of `target` with the field values of `source`
    async fn copy_current_values(&self, target: &Record, source: Record) -> Result<()>;

    /// Applies all staged changes in one transaction
    async fn commit(&self) -> Result<CommitSummary>;

    /// Number of staged changes
    async fn pending_changes(&self) -> usize;

    /// Drops all staged changes
    async fn discard_changes(&self);

    /// Captures the staged changes so far
    async fn savepoint(&self) -> Self::Savepoint;

    /// Puts the unit of work back to `savepoint`, dropping anything staged
    /// after it was taken
    async fn rollback_to(&self, savepoint: Self::Savepoint);

    /// Releases the connection; later calls fail with `Disposed`
    async fn dispose(&self) -> Result<()>;
}
