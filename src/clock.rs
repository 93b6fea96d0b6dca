//! Injectable clock for date-time milestoning.
//!
//! The planner reads the clock exactly once per planning call so that
//! batch-id and date-time column pairs are stamped from the same instant.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed instant, for deterministic planning in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(rfc3339: &str) -> Self {
        let ts = DateTime::parse_from_rfc3339(rfc3339)
            .expect("FixedClock::at requires an RFC 3339 timestamp")
            .with_timezone(&Utc);
        FixedClock(ts)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
