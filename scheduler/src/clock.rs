use chrono::{NaiveDate, Utc};

/// Calendar-day clock used by the lifecycle preconditions ("before the start
/// date", "after the end date"). Injected so tests can pin the date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}
