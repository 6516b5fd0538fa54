//! Synchronous facade
//!
//! Wraps a [`Repository`] together with its own Tokio runtime for callers
//! that are not async. Each call blocks the current thread until the
//! underlying async operation finishes, with identical results.
//!
//! Must not be used from inside another Tokio runtime.

use tokio::runtime::{Builder, Runtime};

use core_runtime::config::PersistenceConfig;

use crate::batch::BatchReport;
use crate::busy::BusyGuard;
use crate::entity::Entity;
use crate::error::{PersistenceError, Result};
use crate::lifecycle::SaveAction;
use crate::models::MediaPlayer;
use crate::repository::Repository;
use crate::store::{SqliteStore, Store};

pub struct BlockingRepository<S: Store> {
    // dropped before the runtime it was created on
    inner: Repository<S>,
    runtime: Runtime,
}

impl BlockingRepository<SqliteStore> {
    /// Blocking counterpart of [`Repository::open`]
    pub fn open(config: &PersistenceConfig) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = runtime.block_on(Repository::open(config))?;
        Ok(Self { inner, runtime })
    }
}

impl<S: Store> BlockingRepository<S> {
    /// Wraps an existing repository with a fresh runtime
    pub fn new(inner: Repository<S>) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: build_runtime()?,
        })
    }

    pub fn inner(&self) -> &Repository<S> {
        &self.inner
    }

    pub fn busy_guard(&self) -> &BusyGuard {
        self.inner.busy_guard()
    }

    pub fn save<E: Entity>(&self, entity: &mut E) -> Result<SaveAction> {
        self.runtime.block_on(self.inner.save(entity))
    }

    pub fn save_all<E: Entity>(&self, entities: &mut [E]) -> Result<BatchReport> {
        self.runtime.block_on(self.inner.save_all(entities))
    }

    pub fn get_by_id<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        self.runtime.block_on(self.inner.get_by_id(id))
    }

    pub fn get_all<E: Entity>(&self) -> Result<Vec<E>> {
        self.runtime.block_on(self.inner.get_all())
    }

    pub fn get_main_media_player(&self) -> Result<Option<MediaPlayer>> {
        self.runtime.block_on(self.inner.get_main_media_player())
    }

    pub fn get_all_optional_media_players(&self) -> Result<Vec<MediaPlayer>> {
        self.runtime.block_on(self.inner.get_all_optional_media_players())
    }

    pub fn discard_pending_changes(&self) {
        self.runtime.block_on(self.inner.discard_pending_changes())
    }

    pub fn dispose(&self) -> Result<()> {
        self.runtime.block_on(self.inner.dispose())
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PersistenceError::Runtime(format!("Failed to start runtime: {}", e)))
}
