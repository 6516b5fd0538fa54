//! Per-kind save and load behaviour
//!
//! Each working-instance type says how it stages itself (and its owned
//! children) and how it is rebuilt from a stored record. The repository
//! drives everything else generically.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cascade::cascade_children;
use crate::error::Result;
use crate::lifecycle::{classify, LifecycleFlags, SaveAction};
use crate::models::{
    AudioDevice, AudioDeviceRecord, DomainRecord, EntityKind, MediaItem, MediaItemRecord,
    MediaPlayer, MediaPlayerRecord, Playlist, PlaylistRecord, Record, Tracked,
};
use crate::repository::Repository;
use crate::store::{RecordQuery, Store};

/// A working instance the repository can save and load
#[async_trait]
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    fn flags(&self) -> LifecycleFlags;

    /// Stages this instance and cascades to its owned children. Never commits.
    async fn persist<S: Store>(
        &mut self,
        repo: &Repository<S>,
        cancel: &CancellationToken,
    ) -> Result<SaveAction>;

    /// Rebuilds the instance, with its children attached, from a stored record
    async fn hydrate<S: Store>(repo: &Repository<S>, record: Record) -> Result<Self>;
}

#[async_trait]
impl Entity for MediaItem {
    const KIND: EntityKind = EntityKind::MediaItem;

    fn id(&self) -> i64 {
        self.record.id
    }

    fn flags(&self) -> LifecycleFlags {
        Tracked::flags(self)
    }

    async fn persist<S: Store>(
        &mut self,
        repo: &Repository<S>,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        repo.stage(self, cancel).await
    }

    async fn hydrate<S: Store>(_repo: &Repository<S>, record: Record) -> Result<Self> {
        Ok(Tracked::loaded(MediaItemRecord::from_record(record)?))
    }
}

#[async_trait]
impl Entity for AudioDevice {
    const KIND: EntityKind = EntityKind::AudioDevice;

    fn id(&self) -> i64 {
        self.record.id
    }

    fn flags(&self) -> LifecycleFlags {
        Tracked::flags(self)
    }

    async fn persist<S: Store>(
        &mut self,
        repo: &Repository<S>,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        repo.stage(self, cancel).await
    }

    async fn hydrate<S: Store>(_repo: &Repository<S>, record: Record) -> Result<Self> {
        Ok(Tracked::loaded(AudioDeviceRecord::from_record(record)?))
    }
}

#[async_trait]
impl Entity for Playlist {
    const KIND: EntityKind = EntityKind::Playlist;

    fn id(&self) -> i64 {
        self.tracked.id()
    }

    fn flags(&self) -> LifecycleFlags {
        self.tracked.flags()
    }

    async fn persist<S: Store>(
        &mut self,
        repo: &Repository<S>,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        // never persisted, nothing to delete
        self.items.retain(|item| !(item.is_new() && item.is_deleted()));

        let action = classify(self.tracked.flags());
        if action == SaveAction::Delete {
            self.items.retain(|item| !item.is_new());
            for item in &mut self.items {
                item.mark_deleted();
            }
        }

        repo.stage(&mut self.tracked, cancel).await?;

        if action != SaveAction::Delete {
            let playlist_id = self.tracked.id();
            for (sequence, item) in self
                .items
                .iter_mut()
                .filter(|item| !item.is_deleted())
                .enumerate()
            {
                item.record.playlist_id = playlist_id;
                item.record.sequence = sequence as i64;
            }
        }

        cascade_children(self.items.iter_mut(), move |item, scope| {
            repo.save_scoped(item, scope, cancel)
        })
        .await?;

        self.purge_deleted_items();
        Ok(action)
    }

    async fn hydrate<S: Store>(repo: &Repository<S>, record: Record) -> Result<Self> {
        let record = PlaylistRecord::from_record(record)?;
        let items = repo
            .store()
            .query(RecordQuery::MediaItemsOf {
                playlist_id: record.id,
            })
            .await?
            .into_iter()
            .map(MediaItemRecord::from_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(Playlist::loaded(record, items))
    }
}

#[async_trait]
impl Entity for MediaPlayer {
    const KIND: EntityKind = EntityKind::MediaPlayer;

    fn id(&self) -> i64 {
        self.tracked.id()
    }

    fn flags(&self) -> LifecycleFlags {
        self.tracked.flags()
    }

    async fn persist<S: Store>(
        &mut self,
        repo: &Repository<S>,
        cancel: &CancellationToken,
    ) -> Result<SaveAction> {
        let discard_playlist = self
            .playlist
            .as_ref()
            .is_some_and(|playlist| playlist.is_new() && playlist.is_deleted());
        if discard_playlist {
            self.playlist = None;
        }

        let action = classify(self.tracked.flags());

        if action == SaveAction::Delete {
            // the player holds the foreign key, so it goes first; the
            // playlist is only referenced and keeps its own flags
            repo.stage(&mut self.tracked, cancel).await?;

            cascade_children(self.playlist.iter_mut(), move |playlist, scope| {
                repo.save_scoped(playlist, scope, cancel)
            })
            .await?;

            return Ok(action);
        }

        // the playlist key becomes the player's foreign key
        cascade_children(self.playlist.iter_mut(), move |playlist, scope| {
            repo.save_scoped(playlist, scope, cancel)
        })
        .await?;

        if let Some(playlist) = &self.playlist {
            self.tracked.record.playlist_id = playlist.id();
        }

        repo.stage(&mut self.tracked, cancel).await
    }

    async fn hydrate<S: Store>(repo: &Repository<S>, record: Record) -> Result<Self> {
        let record = MediaPlayerRecord::from_record(record)?;

        let playlist = match repo
            .store()
            .find_by_id(EntityKind::Playlist, record.playlist_id)
            .await?
        {
            Some(found) => Some(Playlist::hydrate(repo, found).await?),
            None => {
                warn!(
                    player_id = record.id,
                    playlist_id = record.playlist_id,
                    "Media player references a missing playlist"
                );
                None
            }
        };

        Ok(MediaPlayer::loaded(record, playlist))
    }
}
