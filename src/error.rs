// src/error.rs
use thiserror::Error;

/// Errors a caller of the store or the query service can observe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpoError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("offering not found: {0}")]
    NotFound(String),
}

impl IpoError {
    pub fn validation(message: impl Into<String>) -> Self {
        IpoError::Validation(message.into())
    }

    pub fn not_found(offering_id: impl Into<String>) -> Self {
        IpoError::NotFound(offering_id.into())
    }
}

pub type IpoResult<T> = std::result::Result<T, IpoError>;
