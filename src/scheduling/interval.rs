// src/scheduling/interval.rs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Half-open time span `[start, end)`.
///
/// Two spans that merely touch (`a.end == b.start`) do not overlap, so
/// back-to-back bookings are always legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Interval { start, end }
    }

    /// Span beginning at `start` and lasting `duration_minutes`.
    pub fn from_start_duration(start: DateTime<Utc>, duration_minutes: i32) -> Self {
        Interval {
            start,
            end: start + Duration::minutes(duration_minutes as i64),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// The single overlap predicate used everywhere in scheduling.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn span(h1: u32, m1: u32, h2: u32, m2: u32) -> Interval {
        Interval::new(at(h1, m1), at(h2, m2))
    }

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (span(10, 0, 10, 30), span(10, 15, 10, 45)),
            (span(10, 0, 11, 0), span(10, 15, 10, 30)),
            (span(10, 0, 10, 30), span(10, 30, 11, 0)),
            (span(8, 0, 9, 0), span(14, 0, 15, 0)),
        ];
        for (a, b) in cases {
            assert_eq!(a.overlaps(&b), b.overlaps(&a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        let first = span(10, 0, 10, 30);
        let second = span(10, 30, 11, 0);
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
    }

    #[test]
    fn partial_and_contained_spans_overlap() {
        let base = span(10, 0, 11, 0);
        assert!(base.overlaps(&span(10, 30, 11, 30)));
        assert!(base.overlaps(&span(9, 30, 10, 1)));
        assert!(base.overlaps(&span(10, 15, 10, 45)));
        assert!(base.overlaps(&span(9, 0, 12, 0)));
    }

    #[test]
    fn disjoint_spans_do_not_overlap() {
        assert!(!span(8, 0, 9, 0).overlaps(&span(9, 1, 10, 0)));
    }

    #[test]
    fn duration_follows_from_start() {
        let iv = Interval::from_start_duration(at(9, 0), 45);
        assert_eq!(iv.end, at(9, 45));
        assert_eq!(iv.duration_minutes(), 45);
    }
}
