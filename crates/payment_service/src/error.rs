use store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("timeline error: {0}")]
    Timeline(#[from] timeline::TimelineError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict { .. } => ServiceError::Conflict(err.to_string()),
            other => ServiceError::Store(other),
        }
    }
}
