// error.rs
// Error taxonomy shared by every core operation.

use mongodb::bson;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or out-of-range input, reported to the caller verbatim.
    #[error("{0}")]
    Validation(String),
    /// Missing entity, or an entity owned by another user.
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("category type mismatch: {0}")]
    TypeMismatch(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("exchange rate unavailable: {0}")]
    RateUnavailable(String),
    #[error("insufficient funds: requested {requested:.2}, available {available:.2}")]
    InsufficientFunds { available: f64, requested: f64 },
    #[error("notification failed: {0}")]
    Notification(String),
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialization(#[from] bson::ser::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    /// Caller mistakes; everything else is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_)
                | CoreError::NotFound(_)
                | CoreError::InvalidCategory(_)
                | CoreError::TypeMismatch(_)
                | CoreError::Conflict(_)
                | CoreError::InsufficientFunds { .. }
        )
    }

    /// True when the driver rejected a write on a unique index.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            CoreError::Database(err) => is_duplicate_key(err),
            _ => false,
        }
    }
}

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == 11000,
        ErrorKind::Command(command) => command.code == 11000,
        _ => false,
    }
}
