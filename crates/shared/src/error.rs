use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single call against the mixing server.
#[derive(Debug, Clone, Error)]
pub enum RemoteCallError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection to the mixing server is closed")]
    Disconnected,
    #[error("request {request_type} timed out after {after:?}")]
    Timeout {
        request_type: String,
        after: Duration,
    },
    #[error("request {request_type} failed with code {code}: {comment}")]
    Request {
        request_type: String,
        code: u16,
        comment: String,
    },
    #[error("unexpected response to {request_type}: {detail}")]
    UnexpectedResponse {
        request_type: String,
        detail: String,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RemoteCallError {
    pub fn unexpected(request_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            request_type: request_type.into(),
            detail: detail.into(),
        }
    }
}

/// An inbound envelope entry that could not be routed to watchers.
#[derive(Debug, Clone, Error)]
#[error("malformed envelope entry {name:?}: {reason}")]
pub struct MalformedEnvelope {
    pub name: String,
    pub reason: String,
}

impl MalformedEnvelope {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Remote,
    Value,
    Config,
}

/// Short operator-facing status line for a failed panel action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub message: String,
}

impl StatusMessage {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&RemoteCallError> for StatusMessage {
    fn from(value: &RemoteCallError) -> Self {
        Self::new(StatusKind::Remote, value.to_string())
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::Value => "value",
            Self::Config => "config",
        })
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
