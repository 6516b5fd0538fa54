//! Lifecycle classification of working instances

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-level operation chosen for a working instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveAction {
    Create,
    Update,
    Delete,
}

impl SaveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveAction::Create => "create",
            SaveAction::Update => "update",
            SaveAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SaveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient flags of a working instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleFlags {
    pub is_new: bool,
    pub is_deleted: bool,
}

/// Whether a save commits on completion or only stages its changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveScope {
    /// Outermost save; commits when it succeeds
    Root,
    /// Cascaded or batched save; never commits on its own
    Nested,
}

impl SaveScope {
    pub fn is_root(&self) -> bool {
        matches!(self, SaveScope::Root)
    }
}

/// Picks the action for a working instance.
///
/// `is_new` is consulted first, so an instance that is both new and deleted
/// classifies as [`SaveAction::Create`]. Such instances must be discarded
/// before they reach the classifier.
pub fn classify(flags: LifecycleFlags) -> SaveAction {
    if flags.is_new {
        SaveAction::Create
    } else if flags.is_deleted {
        SaveAction::Delete
    } else {
        SaveAction::Update
    }
}
