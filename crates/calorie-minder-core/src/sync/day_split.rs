//! Day-boundary normalization of raw expenditure points.
//!
//! A raw point may straddle one or more local midnights. It is cut at each
//! midnight so that every stored interval lies inside one local calendar day.
//! Calories are shared in proportion to the time spent in each day, with the
//! last piece taking the remainder so the total is preserved exactly.
//!
//! Boundaries use the UTC offset observed at the point's start. A piece that
//! ends at a boundary stops one nanosecond short of it; the following piece
//! starts on the boundary.

use chrono::{TimeZone, Utc};

use crate::clock::{local_midnight_nanos, LocalZone};
use crate::storage::ExpenditureInterval;

use super::types::RawPoint;

/// Why a raw point could not be turned into intervals.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectedPoint {
    #[error("interval end {end} is not after start {start}")]
    EmptySpan { start: i64, end: i64 },

    #[error("calorie value {0} is negative or not finite")]
    BadCalories(f64),
}

/// Split `point` at every local midnight it crosses.
///
/// # Errors
/// Rejects points with `end <= start` or with negative or non-finite calories.
pub fn split_at_local_midnights(
    point: &RawPoint,
    zone: &LocalZone,
) -> Result<Vec<ExpenditureInterval>, RejectedPoint> {
    let RawPoint {
        start_nanos: start,
        end_nanos: end,
        calories,
    } = *point;

    if end <= start {
        return Err(RejectedPoint::EmptySpan { start, end });
    }
    if !calories.is_finite() || calories < 0.0 {
        return Err(RejectedPoint::BadCalories(calories));
    }

    let first_day = zone.date_of_nanos(start);
    // `end` is exclusive: a point ending exactly at midnight stays in its day.
    let last_day = zone.date_of_nanos(end - 1);
    if first_day == last_day {
        return Ok(vec![ExpenditureInterval {
            start_nanos: start,
            end_nanos: end,
            calories,
        }]);
    }

    let offset = zone.offset_at(Utc.timestamp_nanos(start));
    let boundaries: Vec<i64> = first_day
        .iter_days()
        .skip(1)
        .take_while(|day| *day <= last_day)
        .map(|day| local_midnight_nanos(day, offset))
        .filter(|b| *b > start && *b < end)
        .collect();

    if boundaries.len() > 1 {
        tracing::warn!(
            "expenditure point [{start}, {end}) spans {} local midnights",
            boundaries.len()
        );
    }

    let span = (end - start) as f64;
    let mut pieces = Vec::with_capacity(boundaries.len() + 1);
    let mut piece_start = start;
    let mut assigned = 0.0;

    for boundary in boundaries {
        let share = calories * (boundary - piece_start) as f64 / span;
        // A piece shorter than 1ns cannot be stored; its share rolls into the remainder.
        if boundary - 1 > piece_start {
            pieces.push(ExpenditureInterval {
                start_nanos: piece_start,
                end_nanos: boundary - 1,
                calories: share,
            });
            assigned += share;
        }
        piece_start = boundary;
    }

    pieces.push(ExpenditureInterval {
        start_nanos: piece_start,
        end_nanos: end,
        calories: calories - assigned,
    });
    Ok(pieces)
}
