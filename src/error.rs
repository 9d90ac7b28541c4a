use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiniError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Cannot open database: {0}")]
    CantOpen(String),

    #[error("Corrupt: {0}")]
    Corrupt(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl MiniError {
    /// True for the error kinds that abort the whole transaction rather than
    /// just the current statement.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MiniError::Io(_) | MiniError::Storage(_) | MiniError::CantOpen(_)
        )
    }
}
