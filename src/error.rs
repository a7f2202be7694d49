//! Error types for core operations
//!
//! Errors are classified by who can fix them:
//! - Validation: the request itself is wrong; nothing was written
//! - NotFound: a referenced record does not exist; nothing was written
//! - Unauthorized: bad credentials, or a role that may not do this
//! - Internal: the store failed; the in-flight transaction was rolled back

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;
use crate::entity::EntityKind;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("Credential hashing failed: {0}")]
    Credential(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<rusqlite::Error> for CrmError {
    fn from(e: rusqlite::Error) -> Self {
        CrmError::Storage(DbError::Sqlite(e))
    }
}

impl CrmError {
    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::Validation(message.into())
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        CrmError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CrmError::Validation(_) | CrmError::Conflict(_) => ErrorKind::Validation,
            CrmError::Storage(DbError::SequenceExhausted(_)) => ErrorKind::Validation,
            CrmError::NotFound { .. } => ErrorKind::NotFound,
            CrmError::InvalidCredentials | CrmError::Forbidden => ErrorKind::Unauthorized,
            CrmError::Credential(_) | CrmError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// True only for lock contention with another writer. Nothing in the core
    /// retries; the caller may repeat the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrmError::Storage(DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _))) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Status code an HTTP layer would map this to.
    pub fn http_status(&self) -> u16 {
        match self {
            CrmError::Conflict(_) => 409,
            CrmError::Forbidden => 403,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::NotFound => 404,
                ErrorKind::Unauthorized => 401,
                ErrorKind::Internal => 500,
            },
        }
    }
}

/// Error classification for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Internal,
}

/// Serializable error for the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    pub retryable: bool,
}

impl From<&CrmError> for ErrorPayload {
    fn from(err: &CrmError) -> Self {
        // Storage details stay in the log
        let message = match err {
            CrmError::Storage(inner @ DbError::SequenceExhausted(_)) => inner.to_string(),
            CrmError::Storage(_) | CrmError::Credential(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
            status: err.http_status(),
            retryable: err.is_retryable(),
        }
    }
}

pub type CrmResult<T> = Result<T, CrmError>;
