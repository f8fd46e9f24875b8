use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpgError {
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, EpgError>;

impl<T> From<std::sync::PoisonError<T>> for EpgError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
