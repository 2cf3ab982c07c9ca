//! Crate-wide error type
//!
//! Every persistence failure surfaces here. Only SQLite lock contention is
//! turned into a domain signal (`Conflict`); everything else propagates as-is
//! so a failed aggregate update can never be swallowed.

use rusqlite::ErrorCode;

#[derive(Debug)]
pub enum OmsError {
    Database(rusqlite::Error),
    NotFound { entity: &'static str, id: String },
    Conflict(String),
    BadRequest(String),
    InvalidDecimal(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OmsError>;

impl OmsError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        OmsError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the caller may retry the operation with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OmsError::Conflict(_))
    }

    /// Short machine-readable kind used by the request boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            OmsError::NotFound { .. } => "not_found",
            OmsError::Conflict(_) => "conflict",
            OmsError::BadRequest(_) | OmsError::InvalidDecimal(_) => "bad_request",
            OmsError::Database(_)
            | OmsError::Io(_)
            | OmsError::Serialization(_)
            | OmsError::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for OmsError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                OmsError::Conflict(err.to_string())
            }
            _ => OmsError::Database(err),
        }
    }
}

impl From<std::io::Error> for OmsError {
    fn from(err: std::io::Error) -> Self {
        OmsError::Io(err)
    }
}

impl From<serde_json::Error> for OmsError {
    fn from(err: serde_json::Error) -> Self {
        OmsError::Serialization(err)
    }
}

impl From<rust_decimal::Error> for OmsError {
    fn from(err: rust_decimal::Error) -> Self {
        OmsError::InvalidDecimal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for OmsError {
    fn from(err: tokio::task::JoinError) -> Self {
        OmsError::Internal(format!("blocking task failed: {}", err))
    }
}

impl std::fmt::Display for OmsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OmsError::Database(e) => write!(f, "Database error: {}", e),
            OmsError::NotFound { entity, id } => write!(f, "{} {} not found", entity, id),
            OmsError::Conflict(msg) => write!(f, "Write conflict: {}", msg),
            OmsError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            OmsError::InvalidDecimal(msg) => write!(f, "Invalid decimal: {}", msg),
            OmsError::Io(e) => write!(f, "IO error: {}", e),
            OmsError::Serialization(e) => write!(f, "Serialization error: {}", e),
            OmsError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for OmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OmsError::Database(e) => Some(e),
            OmsError::Io(e) => Some(e),
            OmsError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}
