//! Error types for FortiManager client operations

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::protocol::{Method, StatusKind};
use crate::sanitize;
use crate::task::Task;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, FmgError>;

/// Coarse error category, stable for serialisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Authentication,
    Transport,
    Remote,
    LockConflict,
    TaskTimeout,
    RetryExhausted,
    EffectUnknown,
    NotConnected,
    Validation,
    UnknownCapability,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Transport => "transport",
            ErrorKind::Remote => "remote",
            ErrorKind::LockConflict => "lock_conflict",
            ErrorKind::TaskTimeout => "task_timeout",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::EffectUnknown => "effect_unknown",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::Validation => "validation",
            ErrorKind::UnknownCapability => "unknown_capability",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors that can occur while talking to the appliance
#[derive(Error, Debug)]
pub enum FmgError {
    /// DNS, TCP, TLS or timeout failure
    #[error("Connection failed: {message}")]
    Connectivity {
        message: String,
        /// Whether the request may have reached the appliance
        request_sent: bool,
    },

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP-level failure or a body that is not a valid response envelope
    #[error("Invalid response: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        body: String,
    },

    /// The appliance rejected the operation
    #[error("{kind} (code {code}) for {url}: {message}")]
    Remote {
        kind: StatusKind,
        code: i64,
        message: String,
        url: String,
    },

    /// Another holder owns the ADOM workspace lock
    #[error("ADOM '{adom}' is locked by another holder: {message}")]
    LockConflict { adom: String, message: String },

    /// The task did not reach a terminal state before the deadline
    #[error("Task {} still {:?} after {waited:?}", .task.id, .task.status)]
    TaskTimeout { task: Box<Task>, waited: Duration },

    /// Retry budget exhausted; carries the last failure
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<FmgError> },

    /// A non-idempotent request failed after it may have been applied
    #[error("Outcome of '{method}' unknown, it may have been applied: {source}")]
    EffectUnknown {
        method: Method,
        source: Box<FmgError>,
    },

    #[error("Client is not connected")]
    NotConnected,

    /// Rejected input; never carries the offending value
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FmgError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FmgError::Connectivity { .. } => ErrorKind::Connectivity,
            FmgError::Authentication(_) => ErrorKind::Authentication,
            FmgError::Transport { .. } => ErrorKind::Transport,
            FmgError::Remote { .. } => ErrorKind::Remote,
            FmgError::LockConflict { .. } => ErrorKind::LockConflict,
            FmgError::TaskTimeout { .. } => ErrorKind::TaskTimeout,
            FmgError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            FmgError::EffectUnknown { .. } => ErrorKind::EffectUnknown,
            FmgError::NotConnected => ErrorKind::NotConnected,
            FmgError::Validation { .. } => ErrorKind::Validation,
            FmgError::UnknownCapability(_) => ErrorKind::UnknownCapability,
            FmgError::Config(_) => ErrorKind::Config,
            FmgError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Innermost error, looking through retry and effect-unknown wrappers
    pub fn root(&self) -> &FmgError {
        match self {
            FmgError::RetryExhausted { last, .. } => last.root(),
            FmgError::EffectUnknown { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when a mutation may or may not have been applied remotely
    pub fn is_effect_unknown(&self) -> bool {
        match self {
            FmgError::EffectUnknown { .. } => true,
            FmgError::RetryExhausted { last, .. } => last.is_effect_unknown(),
            _ => false,
        }
    }

    /// Remote status classification, if the appliance produced one
    pub fn status_kind(&self) -> Option<StatusKind> {
        match self.root() {
            FmgError::Remote { kind, .. } => Some(*kind),
            FmgError::LockConflict { .. } => Some(StatusKind::LockConflict),
            _ => None,
        }
    }

    /// Remote status code, if any
    pub fn code(&self) -> Option<i64> {
        match self.root() {
            FmgError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self.root(), FmgError::Authentication(_))
            || self.status_kind() == Some(StatusKind::SessionExpired)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_kind() == Some(StatusKind::ObjectNotFound)
    }

    pub fn is_duplicate(&self) -> bool {
        self.status_kind() == Some(StatusKind::ObjectAlreadyExists)
    }

    pub fn is_permission_error(&self) -> bool {
        self.status_kind() == Some(StatusKind::PermissionDenied)
    }

    /// Transient failures worth retrying at a higher level
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            FmgError::Connectivity { .. } => true,
            FmgError::Remote { kind, .. } => matches!(
                kind,
                StatusKind::SessionExpired | StatusKind::InternalServerError
            ),
            _ => false,
        }
    }

    /// Message for callers. Request URLs and ADOM names can carry caller
    /// input, so they stay in the logs and out of this text.
    pub fn caller_message(&self) -> String {
        match self {
            FmgError::Remote { kind, code, .. } => format!("{} (code {})", kind, code),
            FmgError::LockConflict { message, .. } => {
                format!("ADOM workspace is locked by another holder: {}", message)
            }
            FmgError::RetryExhausted { attempts, last } => {
                format!("Gave up after {} attempts: {}", attempts, last.caller_message())
            }
            FmgError::EffectUnknown { method, source } => format!(
                "Outcome of '{}' unknown, it may have been applied: {}",
                method,
                source.caller_message()
            ),
            other => other.to_string(),
        }
    }

    /// Caller-safe summary of this error
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: sanitize::scrub_text(&self.caller_message()),
            code: self.code(),
            effect_unknown: self.is_effect_unknown(),
        }
    }
}

impl From<crate::config::ConfigError> for FmgError {
    fn from(err: crate::config::ConfigError) -> Self {
        FmgError::Config(err.to_string())
    }
}

impl From<url::ParseError> for FmgError {
    fn from(err: url::ParseError) -> Self {
        FmgError::Config(format!("invalid URL: {}", err))
    }
}

/// Serialisable error summary handed back to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub effect_unknown: bool,
}
