use thiserror::Error;

pub mod todo;
pub mod user;

/// Failures from the entity handlers, mapped onto HTTP codes in `error.rs`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Validation failed on {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Authentication failed")]
    Authentication,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Token(#[from] crate::auth::TokenError),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}
