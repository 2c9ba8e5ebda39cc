// src/scheduling/slots.rs

use chrono::Duration;

use super::interval::Interval;

/// Bookable slots on a fixed grid anchored at the window open time.
///
/// Candidates advance by `slot_minutes` regardless of whether the previous
/// candidate was free: the grid stays aligned to the opening time instead of
/// packing slots immediately after busy periods. A candidate is emitted only
/// if it overlaps none of `busy` (all of them are scanned, since bookings
/// with odd durations can leave free gaps mid-window). A partial slot at the
/// window tail is never emitted.
pub fn slot_grid(window: Interval, slot_minutes: i32, busy: &[Interval]) -> Vec<Interval> {
    if slot_minutes <= 0 {
        return Vec::new();
    }
    let step = Duration::minutes(slot_minutes as i64);

    let mut slots = Vec::new();
    let mut t = window.start;
    while t + step <= window.end {
        let candidate = Interval::new(t, t + step);
        if !busy.iter().any(|b| candidate.overlaps(b)) {
            slots.push(candidate);
        }
        t += step;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn working_day() -> Interval {
        Interval::new(at(8, 0), at(18, 0))
    }

    #[test]
    fn empty_day_yields_full_grid() {
        let slots = slot_grid(working_day(), 30, &[]);
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0].start, at(8, 0));
        assert_eq!(slots[0].end, at(8, 30));
        assert_eq!(slots[19].start, at(17, 30));
        assert_eq!(slots[19].end, at(18, 0));
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn booked_slot_is_excluded_others_remain() {
        let busy = [Interval::new(at(9, 0), at(9, 30))];
        let slots = slot_grid(working_day(), 30, &busy);
        assert_eq!(slots.len(), 19);
        assert!(!slots.iter().any(|s| s.start == at(9, 0)));
        assert!(slots.iter().any(|s| s.start == at(8, 30)));
        assert!(slots.iter().any(|s| s.start == at(9, 30)));
    }

    #[test]
    fn unaligned_booking_blocks_every_grid_slot_it_touches() {
        // 09:15-09:45 straddles two grid cells; both must go.
        let busy = [Interval::new(at(9, 15), at(9, 45))];
        let slots = slot_grid(working_day(), 30, &busy);
        assert_eq!(slots.len(), 18);
        assert!(!slots.iter().any(|s| s.start == at(9, 0)));
        assert!(!slots.iter().any(|s| s.start == at(9, 30)));
        assert!(slots.iter().any(|s| s.start == at(10, 0)));
    }

    #[test]
    fn partial_tail_slot_is_dropped() {
        // 45 does not divide the 600-minute window: 13 slots, last ends 17:45.
        let slots = slot_grid(working_day(), 45, &[]);
        assert_eq!(slots.len(), 13);
        assert_eq!(slots[12].end, at(17, 45));
        assert!(slots.iter().all(|s| s.end <= at(18, 0)));
    }

    #[test]
    fn grid_stays_anchored_to_open_time_after_busy_period() {
        // A 40-minute booking at open; the next emitted slot is the next
        // *grid* cell that is free, not 08:40.
        let busy = [Interval::new(at(8, 0), at(8, 40))];
        let slots = slot_grid(working_day(), 30, &busy);
        assert_eq!(slots[0].start, at(9, 0));
    }

    #[test]
    fn zero_length_window_yields_nothing() {
        let slots = slot_grid(Interval::new(at(8, 0), at(8, 0)), 30, &[]);
        assert!(slots.is_empty());
    }

    #[test]
    fn fully_booked_day_yields_nothing() {
        let busy = [working_day()];
        assert!(slot_grid(working_day(), 30, &busy).is_empty());
    }
}
