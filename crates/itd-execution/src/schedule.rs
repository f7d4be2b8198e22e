use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

/// Once-per-day latch for the end-of-day force exit.
#[derive(Debug)]
pub struct ExitSchedule {
    cutoff: NaiveTime,
    tz: Tz,
    last_fired: Mutex<Option<NaiveDate>>,
}

impl ExitSchedule {
    pub fn new(cutoff: NaiveTime, tz: Tz) -> Self {
        Self {
            cutoff,
            tz,
            last_fired: Mutex::new(None),
        }
    }

    pub fn cutoff(&self) -> NaiveTime {
        self.cutoff
    }

    /// Latch and return the local date if the exit is due and has not
    /// fired today. Check and latch happen under one lock.
    pub fn try_fire(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        let local = now.with_timezone(&self.tz);
        if local.time() < self.cutoff {
            return None;
        }
        let today = local.date_naive();
        let mut last = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        if *last == Some(today) {
            return None;
        }
        *last = Some(today);
        Some(today)
    }

    /// Undo a latch for `date` when the exit could not even start
    /// (positions unreadable), so the next check tries again.
    pub fn release(&self, date: NaiveDate) {
        let mut last = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        if *last == Some(date) {
            *last = None;
        }
    }

    pub fn last_fired(&self) -> Option<NaiveDate> {
        *self.last_fired.lock().unwrap_or_else(|e| e.into_inner())
    }
}
