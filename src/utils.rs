//! Wall-clock helpers

use chrono::{Local, Utc};

/// Seconds since the Unix epoch, as block headers carry it.
pub(crate) fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Local wall-clock in the format event records are stamped with.
pub(crate) fn timestamp_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
