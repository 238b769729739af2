use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};

/// Source of the current UTC calendar date used for day rollover.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Date only changes when you call [`set`](FixedClock::set) or
/// [`advance_days`](FixedClock::advance_days).
#[derive(Clone, Debug)]
pub struct FixedClock {
    current: Arc<Mutex<NaiveDate>>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            current: Arc::new(Mutex::new(date)),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = date;
    }

    pub fn advance_days(&self, days: u64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = *current + chrono::Days::new(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `YYYY-MM-DD`, the format stored in user records.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
