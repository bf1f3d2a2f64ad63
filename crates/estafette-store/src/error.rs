use thiserror::Error;

/// Errors produced by the store layer.
///
/// Business outcomes the router must report to the peer (`AlreadyExists`,
/// `NotFound`) are explicit variants rather than bubbled-up SQL errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record the operation requires does not exist.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness invariant would be violated.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
