//! The seam between the synchronizer and whatever reports expenditure.

use std::future::Future;

use super::types::{RawPoint, SyncError};

/// A remote source of calorie-expenditure points.
pub trait ActivitySource: Send + Sync {
    /// Points overlapping `[start_nanos, end_nanos)`, in any order.
    fn fetch_points(
        &self,
        start_nanos: i64,
        end_nanos: i64,
    ) -> impl Future<Output = Result<Vec<RawPoint>, SyncError>> + Send;
}

/// A fixed in-memory source, handy for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    points: Vec<RawPoint>,
}

impl StaticSource {
    pub fn new(points: Vec<RawPoint>) -> Self {
        Self { points }
    }
}

impl ActivitySource for StaticSource {
    async fn fetch_points(
        &self,
        start_nanos: i64,
        end_nanos: i64,
    ) -> Result<Vec<RawPoint>, SyncError> {
        Ok(self
            .points
            .iter()
            .filter(|p| p.end_nanos > start_nanos && p.start_nanos < end_nanos)
            .cloned()
            .collect())
    }
}
