use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Wall-clock timestamp with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct UnixMillis(pub u64);

impl UnixMillis {
    /// Current wall-clock time in milliseconds since the UNIX epoch.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self(now.as_millis() as u64)
    }

    /// Duration from `self` until `later`, or `None` if `later` is not in the future.
    pub fn checked_duration_until(&self, later: UnixMillis) -> Option<Duration> {
        later
            .0
            .checked_sub(self.0)
            .filter(|delta| *delta > 0)
            .map(Duration::from_millis)
    }

    /// Duration from `self` until `later`, zero if `later` is in the past.
    pub fn saturating_duration_until(&self, later: UnixMillis) -> Duration {
        Duration::from_millis(later.0.saturating_sub(self.0))
    }

    /// Timestamp advanced by the given number of milliseconds.
    pub fn saturating_add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
