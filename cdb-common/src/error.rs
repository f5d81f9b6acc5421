//! Common error types for the bridge

use thiserror::Error;

/// Common result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the bridge crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite "database is locked" / "busy" conditions, which are transient
    pub fn is_database_locked(&self) -> bool {
        match self {
            Error::Database(db_err) => {
                let text = db_err.to_string();
                text.contains("database is locked") || text.contains("database is busy")
            }
            _ => false,
        }
    }
}
