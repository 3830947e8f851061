//! Service-level errors

use thiserror::Error;
use uuid::Uuid;

use crate::orm::RepositoryError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    /// The password field was not a string.
    #[error("password must be a string")]
    InvalidPassword,

    /// A debit would take the balance below zero.
    #[error("user {user_id} has no coins left")]
    InsufficientBalance { user_id: Uuid },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Repository(e) if e.is_not_found())
    }
}
