//! Activity synchronization layer.
//!
//! Pulls calorie-expenditure points from a remote activity service (Google
//! Fit), normalizes them so no stored interval crosses a local midnight, and
//! keeps the trailing part of the stored series fresh by purging and
//! re-fetching it on every pass.

pub mod day_split;
pub mod google_fit;
pub mod source;
pub mod synchronizer;
pub mod types;

#[cfg(test)]
mod synchronizer_tests;

pub use day_split::{split_at_local_midnights, RejectedPoint};
pub use google_fit::{parse_dataset, GoogleFitSource};
pub use source::{ActivitySource, StaticSource};
pub use synchronizer::{ActivitySynchronizer, DEFAULT_EPOCH_START_NANOS};
pub use types::{RawPoint, SyncError, SyncReport};
