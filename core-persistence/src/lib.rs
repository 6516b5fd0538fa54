//! # Media Persistence Core
//!
//! Reconciles the in-memory playlist / media item / media player / audio
//! device graph with a relational store.
//!
//! ## Overview
//!
//! This crate provides:
//! - Lifecycle classification of working instances (create, update, delete)
//! - Audit stamping with an injected clock and principal
//! - Cascading saves from a root entity through its owned children
//! - Bulk saves with bounded transaction size
//! - Reentrant busy tracking across nested saves
//! - A unit-of-work SQLite store with embedded migrations
//!
//! All saves go through [`Repository`]; [`BlockingRepository`] offers the same
//! operations for synchronous callers.

pub mod audit;
pub mod batch;
pub mod blocking;
pub mod busy;
pub mod cascade;
pub mod db;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod store;

pub use blocking::BlockingRepository;
pub use entity::Entity;
pub use error::{PersistenceError, Result};
pub use repository::{Repository, RepositoryBuilder};

/// Common imports for working with the repository
pub mod prelude {
    pub use crate::batch::BatchReport;
    pub use crate::busy::{BusyGuard, BusyScope};
    pub use crate::entity::Entity;
    pub use crate::error::{PersistenceError, Result};
    pub use crate::lifecycle::{SaveAction, SaveScope};
    pub use crate::models::{
        AudioDevice, AudioDeviceRecord, MediaItem, MediaItemRecord, MediaPlayer,
        MediaPlayerRecord, Playlist, PlaylistRecord, Tracked,
    };
    pub use crate::repository::{Repository, RepositoryBuilder};
    pub use crate::store::{SqliteStore, Store};
    pub use core_runtime::config::{BatchCommitPolicy, PersistenceConfig};
}
