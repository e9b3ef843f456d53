use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open window `[start, end)` of consensus timestamps in nanoseconds.
/// A missing `end` means the window is still open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimestampRange {
    pub start: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

impl TimestampRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start {start} after end {end}");
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        timestamp >= self.start && self.end.is_none_or(|end| timestamp < end)
    }

    /// The timestamp every versioned read of this range is evaluated at:
    /// the last instant inside a bounded range, the lower bound of an open one.
    pub fn read_point(&self) -> u64 {
        match self.end {
            Some(end) => end.saturating_sub(1),
            None => self.start,
        }
    }

    pub fn overlaps(&self, other: &TimestampRange) -> bool {
        let before = |a: &TimestampRange, b: &TimestampRange| a.end.is_some_and(|end| end <= b.start);
        !before(self, other) && !before(other, self)
    }
}

impl fmt::Display for TimestampRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}

/// A value together with the window in which it was the current version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    #[serde(flatten)]
    pub value: T,
    pub range: TimestampRange,
}

impl<T> Versioned<T> {
    pub fn new(value: T, range: TimestampRange) -> Self {
        Self { value, range }
    }
}
