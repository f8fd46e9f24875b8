use chrono::{DateTime, TimeDelta, Utc};

pub type Timestamp = DateTime<Utc>;

/// Smallest gap worth covering with a filler entry, and the margin by which
/// the write-back narrows its conflict delete so boundary-exact neighbours
/// survive.
pub const ONE_SECOND: TimeDelta = TimeDelta::seconds(1);

/// Half-open interval test: `[start, end)` against `[other_start, other_end)`.
pub fn intervals_overlap(
    start: Timestamp,
    end: Timestamp,
    other_start: Timestamp,
    other_end: Timestamp,
) -> bool {
    end > other_start && start < other_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> Timestamp {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        assert!(!intervals_overlap(t(0), t(10), t(10), t(20)));
        assert!(!intervals_overlap(t(10), t(20), t(0), t(10)));
    }

    #[test]
    fn test_nested_and_partial_overlap() {
        assert!(intervals_overlap(t(0), t(20), t(5), t(10)));
        assert!(intervals_overlap(t(0), t(10), t(5), t(15)));
        assert!(intervals_overlap(t(5), t(15), t(0), t(10)));
    }
}
