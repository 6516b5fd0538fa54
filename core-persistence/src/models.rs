//! Domain models for the media persistence core
//!
//! Records are the persisted shape (one row per record). Working instances
//! wrap a record together with the transient lifecycle flags and the owned
//! children a save cascades through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::error::{PersistenceError, Result};
use crate::lifecycle::LifecycleFlags;

// =============================================================================
// Entity kinds
// =============================================================================

/// Kind of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Playlist,
    MediaItem,
    MediaPlayer,
    AudioDevice,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Playlist,
        EntityKind::MediaItem,
        EntityKind::MediaPlayer,
        EntityKind::AudioDevice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Playlist => "playlist",
            EntityKind::MediaItem => "media_item",
            EntityKind::MediaPlayer => "media_player",
            EntityKind::AudioDevice => "audio_device",
        }
    }

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Playlist => "playlists",
            EntityKind::MediaItem => "media_items",
            EntityKind::MediaPlayer => "media_players",
            EntityKind::AudioDevice => "audio_devices",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Records
// =============================================================================

/// Audit columns shared by every record.
///
/// `None` is the empty-equivalent value: a record that was never updated has
/// no `updated_by`/`updated_on`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AuditFields {
    pub created_by: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub updated_on: Option<DateTime<Utc>>,
}

/// Playlist row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl PlaylistRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: None,
            audit: AuditFields::default(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Playlist name cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Media item row, ordered within its playlist by `sequence`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MediaItemRecord {
    pub id: i64,
    pub playlist_id: i64,
    pub title: String,
    pub location: String,
    pub duration_ms: i64,
    pub sequence: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl MediaItemRecord {
    pub fn new(
        playlist_id: i64,
        title: impl Into<String>,
        location: impl Into<String>,
        duration_ms: i64,
    ) -> Self {
        Self {
            id: 0,
            playlist_id,
            title: title.into(),
            location: location.into(),
            duration_ms,
            sequence: 0,
            audit: AuditFields::default(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Media item title cannot be empty".to_string());
        }

        if self.location.trim().is_empty() {
            return Err("Media item location cannot be empty".to_string());
        }

        if self.duration_ms < 0 {
            return Err("Media item duration cannot be negative".to_string());
        }

        if self.playlist_id <= 0 {
            return Err("Media item must belong to a saved playlist".to_string());
        }

        Ok(())
    }
}

/// Media player row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MediaPlayerRecord {
    pub id: i64,
    pub playlist_id: i64,
    pub name: String,
    pub is_main: bool,
    pub volume: i64,
    pub is_muted: bool,
    pub is_shuffled: bool,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl MediaPlayerRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            playlist_id: 0,
            name: name.into(),
            is_main: false,
            volume: 100,
            is_muted: false,
            is_shuffled: false,
            audit: AuditFields::default(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Media player name cannot be empty".to_string());
        }

        if !(0..=100).contains(&self.volume) {
            return Err(format!("Volume {} is out of range 0..=100", self.volume));
        }

        if self.playlist_id <= 0 {
            return Err("Media player must reference a saved playlist".to_string());
        }

        Ok(())
    }
}

/// Audio output device row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AudioDeviceRecord {
    pub id: i64,
    pub name: String,
    pub device_key: String,
    pub is_enabled: bool,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl AudioDeviceRecord {
    pub fn new(name: impl Into<String>, device_key: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            device_key: device_key.into(),
            is_enabled: true,
            audit: AuditFields::default(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Audio device name cannot be empty".to_string());
        }

        if self.device_key.trim().is_empty() {
            return Err("Audio device key cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Any persisted record, as exchanged with a [`Store`](crate::store::Store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Playlist(PlaylistRecord),
    MediaItem(MediaItemRecord),
    MediaPlayer(MediaPlayerRecord),
    AudioDevice(AudioDeviceRecord),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Playlist(_) => EntityKind::Playlist,
            Record::MediaItem(_) => EntityKind::MediaItem,
            Record::MediaPlayer(_) => EntityKind::MediaPlayer,
            Record::AudioDevice(_) => EntityKind::AudioDevice,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Record::Playlist(r) => r.id,
            Record::MediaItem(r) => r.id,
            Record::MediaPlayer(r) => r.id,
            Record::AudioDevice(r) => r.id,
        }
    }

    pub fn set_id(&mut self, id: i64) {
        match self {
            Record::Playlist(r) => r.id = id,
            Record::MediaItem(r) => r.id = id,
            Record::MediaPlayer(r) => r.id = id,
            Record::AudioDevice(r) => r.id = id,
        }
    }

    pub fn audit(&self) -> &AuditFields {
        match self {
            Record::Playlist(r) => &r.audit,
            Record::MediaItem(r) => &r.audit,
            Record::MediaPlayer(r) => &r.audit,
            Record::AudioDevice(r) => &r.audit,
        }
    }
}

/// Typed access to a record variant
pub trait DomainRecord: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    fn audit(&self) -> &AuditFields;

    fn audit_mut(&mut self) -> &mut AuditFields;

    /// Field-level checks run before the record is staged
    fn validate(&self) -> std::result::Result<(), String>;

    fn into_record(self) -> Record;

    /// Fails with [`PersistenceError::KindMismatch`] for another variant
    fn from_record(record: Record) -> Result<Self>;
}

macro_rules! domain_record {
    ($record:ident, $variant:ident) => {
        impl DomainRecord for $record {
            const KIND: EntityKind = EntityKind::$variant;

            fn id(&self) -> i64 {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = id;
            }

            fn audit(&self) -> &AuditFields {
                &self.audit
            }

            fn audit_mut(&mut self) -> &mut AuditFields {
                &mut self.audit
            }

            fn validate(&self) -> std::result::Result<(), String> {
                $record::validate(self)
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: Record) -> Result<Self> {
                match record {
                    Record::$variant(inner) => Ok(inner),
                    other => Err(PersistenceError::KindMismatch {
                        expected: EntityKind::$variant,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

domain_record!(PlaylistRecord, Playlist);
domain_record!(MediaItemRecord, MediaItem);
domain_record!(MediaPlayerRecord, MediaPlayer);
domain_record!(AudioDeviceRecord, AudioDevice);

// =============================================================================
// Working instances
// =============================================================================

/// A record plus its transient lifecycle flags (never persisted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked<R> {
    pub record: R,
    is_new: bool,
    is_deleted: bool,
}

impl<R: DomainRecord> Tracked<R> {
    /// Wraps a record that has not been persisted yet
    pub fn new(record: R) -> Self {
        Self {
            record,
            is_new: true,
            is_deleted: false,
        }
    }

    /// Wraps a record loaded from the store
    pub fn loaded(record: R) -> Self {
        Self {
            record,
            is_new: false,
            is_deleted: false,
        }
    }

    pub fn id(&self) -> i64 {
        self.record.id()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Marks the instance for deletion on its next save
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    pub fn flags(&self) -> LifecycleFlags {
        LifecycleFlags {
            is_new: self.is_new,
            is_deleted: self.is_deleted,
        }
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
    }
}

pub type MediaItem = Tracked<MediaItemRecord>;

pub type AudioDevice = Tracked<AudioDeviceRecord>;

/// Playlist with its ordered media items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub(crate) tracked: Tracked<PlaylistRecord>,
    pub(crate) items: Vec<MediaItem>,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tracked: Tracked::new(PlaylistRecord::new(name)),
            items: Vec::new(),
        }
    }

    /// Wraps a stored playlist and its stored items
    pub fn loaded(record: PlaylistRecord, items: Vec<MediaItemRecord>) -> Self {
        Self {
            tracked: Tracked::loaded(record),
            items: items.into_iter().map(Tracked::loaded).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.tracked.record.description = Some(description.into());
        self
    }

    pub fn id(&self) -> i64 {
        self.tracked.id()
    }

    pub fn record(&self) -> &PlaylistRecord {
        &self.tracked.record
    }

    pub fn record_mut(&mut self) -> &mut PlaylistRecord {
        &mut self.tracked.record
    }

    pub fn tracked(&self) -> &Tracked<PlaylistRecord> {
        &self.tracked
    }

    pub fn is_new(&self) -> bool {
        self.tracked.is_new()
    }

    pub fn is_deleted(&self) -> bool {
        self.tracked.is_deleted()
    }

    pub fn mark_deleted(&mut self) {
        self.tracked.mark_deleted();
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [MediaItem] {
        &mut self.items
    }

    /// Appends a new item at the end of the playlist
    pub fn add_item(
        &mut self,
        title: impl Into<String>,
        location: impl Into<String>,
        duration_ms: i64,
    ) -> &mut MediaItem {
        let mut record = MediaItemRecord::new(self.id(), title, location, duration_ms);
        record.sequence = self.items.len() as i64;
        self.items.push(Tracked::new(record));

        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    /// Removes the item at `index`.
    ///
    /// A never-persisted item is dropped right away; a persisted one is
    /// marked deleted and leaves the list once its delete has been staged.
    /// Returns `false` when `index` is out of range.
    pub fn remove_item(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };

        if item.is_new() {
            self.items.remove(index);
        } else {
            item.mark_deleted();
        }

        true
    }

    pub(crate) fn purge_deleted_items(&mut self) {
        self.items.retain(|item| !item.is_deleted());
    }
}

/// Media player with the playlist it plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPlayer {
    pub(crate) tracked: Tracked<MediaPlayerRecord>,
    pub(crate) playlist: Option<Playlist>,
}

impl MediaPlayer {
    pub fn new(name: impl Into<String>, playlist: Playlist) -> Self {
        let mut record = MediaPlayerRecord::new(name);
        record.playlist_id = playlist.id();

        Self {
            tracked: Tracked::new(record),
            playlist: Some(playlist),
        }
    }

    /// Wraps a stored player; `playlist` is `None` when it could not be resolved
    pub fn loaded(record: MediaPlayerRecord, playlist: Option<Playlist>) -> Self {
        Self {
            tracked: Tracked::loaded(record),
            playlist,
        }
    }

    pub fn id(&self) -> i64 {
        self.tracked.id()
    }

    pub fn record(&self) -> &MediaPlayerRecord {
        &self.tracked.record
    }

    pub fn record_mut(&mut self) -> &mut MediaPlayerRecord {
        &mut self.tracked.record
    }

    pub fn tracked(&self) -> &Tracked<MediaPlayerRecord> {
        &self.tracked
    }

    pub fn is_main(&self) -> bool {
        self.tracked.record.is_main
    }

    pub fn set_main(&mut self, is_main: bool) {
        self.tracked.record.is_main = is_main;
    }

    pub fn is_new(&self) -> bool {
        self.tracked.is_new()
    }

    pub fn is_deleted(&self) -> bool {
        self.tracked.is_deleted()
    }

    pub fn mark_deleted(&mut self) {
        self.tracked.mark_deleted();
    }

    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }

    pub fn playlist_mut(&mut self) -> Option<&mut Playlist> {
        self.playlist.as_mut()
    }

    /// Points the player at another playlist
    pub fn set_playlist(&mut self, playlist: Playlist) {
        self.tracked.record.playlist_id = playlist.id();
        self.playlist = Some(playlist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_instances_are_flagged_new() {
        let playlist = Playlist::new("Road trip");
        assert!(playlist.is_new());
        assert!(!playlist.is_deleted());
        assert_eq!(playlist.id(), 0);

        let device = AudioDevice::new(AudioDeviceRecord::new("Speakers", "hw:0"));
        assert!(device.is_new());

        let loaded = Tracked::loaded(AudioDeviceRecord::new("Speakers", "hw:0"));
        assert!(!loaded.is_new());
    }

    #[test]
    fn test_add_item_assigns_sequence() {
        let mut playlist = Playlist::new("Focus");
        playlist.add_item("First", "/music/a.flac", 1_000);
        playlist.add_item("Second", "/music/b.flac", 2_000);

        let sequences: Vec<i64> = playlist.items().iter().map(|i| i.record.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert!(playlist.items().iter().all(|i| i.is_new()));
    }

    #[test]
    fn test_remove_item_discards_new_and_marks_persisted() {
        let mut stored = MediaItemRecord::new(4, "Stored", "/music/s.mp3", 10);
        stored.id = 9;
        let mut playlist = Playlist::loaded(PlaylistRecord::new("Mixed"), vec![stored]);
        playlist.add_item("Fresh", "/music/f.mp3", 10);

        assert!(playlist.remove_item(1));
        assert_eq!(playlist.items().len(), 1);

        assert!(playlist.remove_item(0));
        assert_eq!(playlist.items().len(), 1);
        assert!(playlist.items()[0].is_deleted());

        assert!(!playlist.remove_item(5));

        playlist.purge_deleted_items();
        assert!(playlist.items().is_empty());
    }

    #[test]
    fn test_record_validation() {
        assert!(PlaylistRecord::new("  ").validate().is_err());
        assert!(MediaItemRecord::new(1, "", "/x", 0).validate().is_err());
        assert!(MediaItemRecord::new(1, "t", "", 0).validate().is_err());
        assert!(MediaItemRecord::new(0, "t", "/x", 0).validate().is_err());
        assert!(MediaItemRecord::new(1, "t", "/x", 0).validate().is_ok());

        let mut player = MediaPlayerRecord::new("Main");
        player.playlist_id = 1;
        assert!(player.validate().is_ok());
        player.volume = 101;
        assert!(player.validate().is_err());

        assert!(AudioDeviceRecord::new("Speakers", " ").validate().is_err());
    }

    #[test]
    fn test_record_variant_conversion() {
        let record = PlaylistRecord::new("Chill").into_record();
        assert_eq!(record.kind(), EntityKind::Playlist);
        assert!(PlaylistRecord::from_record(record.clone()).is_ok());

        let err = MediaItemRecord::from_record(record).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::KindMismatch {
                expected: EntityKind::MediaItem,
                found: EntityKind::Playlist
            }
        ));
    }

    #[test]
    fn test_player_tracks_playlist_key() {
        let mut playlist = Playlist::new("Queue");
        playlist.record_mut().id = 12;
        let player = MediaPlayer::new("Main", playlist);

        assert_eq!(player.record().playlist_id, 12);
        assert!(!player.is_main());
    }
}
