//! Error types for thesis-match

use thiserror::Error;

use crate::model::RequestState;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Pending request already exists for student {student_id} and supervisor {supervisor_id}")]
    DuplicateRequest {
        student_id: String,
        supervisor_id: String,
    },

    #[error("Cannot {action} request {request_id} in state {from}")]
    InvalidStateTransition {
        request_id: String,
        from: RequestState,
        action: &'static str,
    },

    #[error("Student {student_id} already has accepted request {request_id}")]
    AlreadyMatched {
        student_id: String,
        request_id: String,
    },

    #[error("Supervisor {0} has no available spots")]
    CapacityExceeded(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MatchError {
    /// Errors the caller can fix by changing input or retrying elsewhere.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MatchError::Validation(_)
                | MatchError::NotFound(_)
                | MatchError::DuplicateRequest { .. }
                | MatchError::InvalidStateTransition { .. }
                | MatchError::AlreadyMatched { .. }
                | MatchError::CapacityExceeded(_)
                | MatchError::Json(_)
        )
    }
}

/// Wrap a rusqlite error with context, like `format!("Failed to ...: {}", e)`
pub(crate) fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> MatchError + '_ {
    move |e| MatchError::Database(format!("{}: {}", context, e))
}
