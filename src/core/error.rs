use thiserror::Error;

/// Failures raised at the directory client boundary.
///
/// `NotFound` is kept separate from the protocol failures because the
/// session treats it as a regular outcome: a missing entry reads as `None`
/// and deletes as a successful no-op.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("name not found: {0}")]
    NotFound(String),

    #[error("name already bound: {0}")]
    AlreadyBound(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum OdmError {
    /// Raised while deriving a type's mapping: missing or duplicate
    /// identity attribute, accessor without a mutator, and the like.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Any directory protocol failure other than not-found. Never retried
    /// internally.
    #[error("Directory operation failed: {0}")]
    Directory(#[from] DirectoryError),

    /// Programming-usage violations: creating an entity without an
    /// identity value, operating on a closed session, and so on.
    #[error("Session error: {0}")]
    Session(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, OdmError>;

impl<T> From<std::sync::PoisonError<T>> for OdmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
