use shared::error::{RemoteCallError, StatusKind, StatusMessage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
    #[error("invalid value for {name}: {reason}")]
    Value { name: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("scheduled task was cancelled")]
    Cancelled,
    #[error("scheduled task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Value {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Status line for the operator, as shown by the panel after a failed action.
    pub fn status(&self) -> StatusMessage {
        match self {
            Self::Remote(err) => StatusMessage::from(err),
            Self::Value { .. } => StatusMessage::new(StatusKind::Value, self.to_string()),
            Self::Config(_) | Self::Cancelled | Self::Task(_) => {
                StatusMessage::new(StatusKind::Config, self.to_string())
            }
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
