//! Time source for record timestamps
//!
//! Stores stamp `created_at` / `updated_at` through a `Clock` so tests can
//! pin time. Timestamps are truncated to milliseconds, the precision the
//! relational backend persists.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

/// Shareable source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at `at`
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

/// Read a clock at millisecond precision
pub(crate) fn stamp(clock: &Clock) -> DateTime<Utc> {
    clock().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = fixed_clock(at);
        assert_eq!(stamp(&clock), at);
        assert_eq!(stamp(&clock), at);
    }

    #[test]
    fn test_stamp_truncates_to_millis() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let stamped = stamp(&fixed_clock(at));
        assert_eq!(stamped.timestamp_subsec_nanos(), 123_000_000);
    }
}
