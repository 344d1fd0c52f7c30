use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    RowNotFound,

    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Errors surfaced by the domain operations. Validation and not-found are
/// request-level failures for the caller to render; store errors are faults.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CrmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CrmError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        CrmError::NotFound { entity, id }
    }
}

pub type CrmResult<T> = Result<T, CrmError>;
