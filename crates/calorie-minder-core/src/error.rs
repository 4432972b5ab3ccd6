//! Core error types for calorie-minder-core.
//!
//! The hierarchy mirrors the three failure domains of the engine: durable
//! storage, configuration, and the two ingestion edges (scale datagrams and
//! the remote activity service). Each loop decides locally whether an error
//! ends the current tick or only drops one record; none of them is fatal to
//! the process.

use std::path::PathBuf;
use thiserror::Error;

pub use crate::sync::types::SyncError;

/// Core error type for calorie-minder-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scale datagram errors
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Activity synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable-storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be opened, is locked, or is otherwise unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Failed to open database file
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be mapped back to its record type
    #[error("Invalid stored record in '{table}': {message}")]
    InvalidRecord { table: &'static str, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Scale datagram errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    /// The datagram did not carry a readable weight field.
    #[error("Malformed payload from {source_addr}: {reason}")]
    MalformedPayload { source_addr: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _msg) => match failure.code {
                rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::ReadOnly
                | rusqlite::ErrorCode::DiskFull
                | rusqlite::ErrorCode::SystemIoFailure => StoreError::Unavailable(err.to_string()),
                _ => StoreError::QueryFailed(err.to_string()),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl StoreError {
    /// Whether the next scheduled tick may reasonably succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::OpenFailed { .. })
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_database_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::from(err).is_unavailable());
    }

    #[test]
    fn constraint_failure_maps_to_query_failed() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(matches!(StoreError::from(err), StoreError::QueryFailed(_)));
    }

    #[test]
    fn malformed_payload_names_the_sender() {
        let err = IngestError::MalformedPayload {
            source_addr: "192.168.1.40:6000".into(),
            reason: "missing weight field".into(),
        };
        assert!(err.to_string().contains("192.168.1.40:6000"));
    }
}
