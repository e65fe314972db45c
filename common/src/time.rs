//! Time utilities for Ratekeeper.
//!
//! Rate resolution is keyed by calendar day, so every component that needs
//! "today" asks a [`Clock`] instead of reading the system time directly.

use chrono::{Local, NaiveDate};
use std::sync::Arc;

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    /// The current local date.
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a single date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(NaiveDate);

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let clock = FixedClock::new(date);
        assert_eq!(clock.today(), date);
    }

    #[test]
    fn test_shared_clock() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let clock: SharedClock = Arc::new(FixedClock::new(date));
        assert_eq!(clock.today(), date);
        assert!(SystemClock.today() > date);
    }
}
