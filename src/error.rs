use thiserror::Error;

use crate::message::types::CommId;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("No such comm target registered: {0}")]
    UnknownTarget(String),

    #[error("No such comm: {0}")]
    UnknownComm(CommId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Send failed after {attempts} attempt(s): {reason}")]
    SendFailed { attempts: u32, reason: String },

    #[error("Receive failed after {attempts} attempt(s): {reason}")]
    ReceiveFailed { attempts: u32, reason: String },

    #[error("Timed out after {duration_ms}ms during {operation}")]
    Timeout { duration_ms: u64, operation: String },

    #[error("Transport closed")]
    Closed,
}

pub type CommResult<T> = std::result::Result<T, CommError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl From<serde_json::Error> for CommError {
    fn from(err: serde_json::Error) -> Self {
        CommError::Serialization(err.to_string())
    }
}

impl From<CommError> for TransportError {
    fn from(err: CommError) -> Self {
        match err {
            CommError::Transport(inner) => inner,
            other => TransportError::Protocol(other.to_string()),
        }
    }
}
