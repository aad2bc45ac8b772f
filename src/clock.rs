//! Source of "now" and "today" for every time-dependent rule.
//!
//! Nothing outside this module calls `chrono::Local::now()` directly; the
//! clock is passed in so tests can freeze the date without touching any
//! shared state.

use std::sync::{PoisonError, RwLock};

use chrono::{Local, NaiveDate, NaiveDateTime};
use tracing::info;

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> NaiveDateTime;
}

/// The local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Wall clock with an optional date override.
///
/// While a mock date is set, `today()` returns it verbatim and `now()`
/// returns the mock date at the real time of day.
#[derive(Debug, Default)]
pub struct MockableClock {
    mock_date: RwLock<Option<NaiveDate>>,
}

impl MockableClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mock(date: NaiveDate) -> Self {
        Self {
            mock_date: RwLock::new(Some(date)),
        }
    }

    pub fn set_mock(&self, date: Option<NaiveDate>) {
        match date {
            Some(d) => info!(mock_date = %d, "Mock date set"),
            None => info!("Mock date cleared"),
        }
        *self
            .mock_date
            .write()
            .unwrap_or_else(PoisonError::into_inner) = date;
    }

    pub fn mock(&self) -> Option<NaiveDate> {
        *self
            .mock_date
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for MockableClock {
    fn today(&self) -> NaiveDate {
        self.mock().unwrap_or_else(|| SystemClock.today())
    }

    fn now(&self) -> NaiveDateTime {
        let real = SystemClock.now();
        match self.mock() {
            Some(date) => date.and_time(real.time()),
            None => real,
        }
    }
}
