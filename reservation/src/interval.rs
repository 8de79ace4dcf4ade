//! Inclusive calendar-day ranges and the overlap/containment primitives.
//
//  This module is deliberately pure: no async, no IO. Every availability and
//  conflict decision in the core reduces to `overlaps` and `contains`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid date range: start {start} is after end {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// An inclusive range of calendar days, `start <= end` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if start > end {
            return Err(InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Two inclusive ranges overlap iff each starts no later than the other
    /// ends.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of nights covered by the range, minimum 1.
    ///
    /// A same-day range still counts as one night so a booking is never free.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days().max(1)
    }

    /// The calendar days of the range, in order. Finite and restartable;
    /// used only to drive blocked-date rendering, never for conflict checks.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// True iff every day of `target` lies inside some range of `ranges`.
///
/// Ranges may arrive unsorted and may touch or overlap each other; coverage
/// through several adjacent ranges counts. Works on the interval form, never
/// day-by-day, so long bookings stay cheap.
pub fn covers(target: &DateRange, ranges: &[DateRange]) -> bool {
    let mut sorted: Vec<DateRange> = ranges.to_vec();
    sorted.sort_by_key(|r| r.start());

    let mut cursor = target.start;
    for r in sorted {
        if r.start > cursor {
            return false;
        }
        if r.end >= cursor {
            match r.end.succ_opt() {
                Some(next) => cursor = next,
                // Calendar overflow: the range runs to the end of time.
                None => return true,
            }
            if cursor > target.end {
                return true;
            }
        }
    }
    false
}
