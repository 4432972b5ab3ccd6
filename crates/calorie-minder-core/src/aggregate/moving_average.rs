//! Trailing moving average that ignores empty days.

use std::collections::VecDeque;

/// Mean of the last `width` strictly positive values.
///
/// Zero (or negative) values are treated as "no data": they neither enter the
/// window nor evict from it, and the previous average is carried forward.
#[derive(Debug, Clone)]
pub struct TrailingAverage {
    window: VecDeque<i64>,
    width: usize,
    current: i64,
}

impl TrailingAverage {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            window: VecDeque::with_capacity(width),
            width,
            current: 0,
        }
    }

    /// Feed the next day's value and return the average to report for it.
    pub fn push(&mut self, value: i64) -> i64 {
        if value > 0 {
            if self.window.len() == self.width {
                self.window.pop_front();
            }
            self.window.push_back(value);
            let sum: i64 = self.window.iter().sum();
            // Window values are positive, so integer division is the floor.
            self.current = sum / self.window.len() as i64;
        }
        self.current
    }
}
