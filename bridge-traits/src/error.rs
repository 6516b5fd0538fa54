use thiserror::Error;

/// Failures raised by host collaborators
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Notification rejected by sink: {0}")]
    Rejected(String),

    #[error("Failed to write notification: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
