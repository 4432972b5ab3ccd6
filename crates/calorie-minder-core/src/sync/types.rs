//! Core types for activity synchronization.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One expenditure point as reported by the remote service, before any
/// day-boundary normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub start_nanos: i64,
    pub end_nanos: i64,
    pub calories: f64,
}

impl RawPoint {
    pub fn new(start_nanos: i64, end_nanos: i64, calories: f64) -> Self {
        Self {
            start_nanos,
            end_nanos,
            calories,
        }
    }
}

/// Outcome of one synchronizer pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Intervals removed by the purge-before-refetch step.
    pub purged: usize,
    /// Lower bound of the fetch window.
    pub fetched_from_nanos: i64,
    /// Upper bound of the fetch window.
    pub fetched_until_nanos: i64,
    /// Raw points returned by the remote service.
    pub points_received: usize,
    /// Points dropped because they were malformed.
    pub points_dropped: usize,
    /// Intervals written after day-boundary splitting.
    pub intervals_written: usize,
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport failure or a non-success status other than auth.
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// The remote service rejected the credentials.
    #[error("Remote authorization failed: {0}")]
    RemoteAuth(String),

    /// The response body could not be decoded into expenditure points.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Errors that only skip the current tick.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::TransientNetwork(_)
            | SyncError::RemoteAuth(_)
            | SyncError::MalformedResponse(_) => true,
            SyncError::Store(err) => err.is_unavailable(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::TransientNetwork(err.to_string())
        }
    }
}
