use bridge_traits::error::BridgeError;
use thiserror::Error;

use crate::models::EntityKind;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: i64 },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Record kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Store has been disposed")]
    Disposed,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl PersistenceError {
    pub(crate) fn invalid(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: kind.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
