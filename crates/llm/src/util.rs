//! Small helpers shared across dialect modules.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, for `created`/`created_at` fields. Falls
/// back to `0` if the system clock is somehow set before the epoch.
pub fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
