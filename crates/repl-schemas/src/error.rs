use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy from the recovery-policy table: each variant is handled by
/// exactly one of the reconnect loop, the group-level retry, an immediate
/// stop, or the skip-errors bitmap.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ReplError {
    #[error("network fatal: {message}")]
    NetworkFatal { message: String },

    #[error("engine transient: {message}")]
    EngineTransient { message: String },

    #[error("protocol fatal: {message}")]
    ProtocolFatal { message: String },

    #[error("position fatal: {message}")]
    PositionFatal { message: String },

    #[error("apply user error {code}: {message}")]
    UserError { code: i32, message: String },

    #[error("cooperative shutdown requested")]
    Shutdown,
}

impl ReplError {
    /// `true` for errors the reconnect/retry loops may recover from without
    /// operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReplError::NetworkFatal { .. } | ReplError::EngineTransient { .. }
        )
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ReplError::UserError { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Concrete shape of "record `{code, message, timestamp}` into state" from
/// §4.5/§7 — stored verbatim on `ApplierState`/`ReceiverState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: Option<i32>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn from_error(err: &ReplError, now: DateTime<Utc>) -> Self {
        Self {
            code: err.code(),
            message: err.message(),
            timestamp: now,
        }
    }
}
