//! Wall-clock time for readings.

use chrono::{DateTime, Utc};

/// Instant a reading was taken, always in UTC.
pub type Timestamp = DateTime<Utc>;

/// Read the system clock.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
