use std::time::Instant;

use chrono::Datelike;

/// Time source for resolution budgets and the "current year" of a run.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn current_year(&self) -> i32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn current_year(&self) -> i32 {
        chrono::Utc::now().year()
    }
}
