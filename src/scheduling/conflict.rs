// src/scheduling/conflict.rs

use uuid::Uuid;

use super::interval::Interval;
use super::store::Appointment;

/// First stored appointment whose interval overlaps the proposal.
///
/// `exclude` skips the record being rescheduled so it cannot collide with
/// itself. Candidates that are no longer active are ignored even if the
/// store returned them.
pub fn first_conflict(
    proposed: Interval,
    exclude: Option<Uuid>,
    existing: &[Appointment],
) -> Option<Uuid> {
    existing
        .iter()
        .filter(|a| Some(a.appointment_id) != exclude)
        .filter(|a| a.status.is_active())
        .find(|a| a.interval().overlaps(&proposed))
        .map(|a| a.appointment_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::transitions::AppointmentStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn booked(start: DateTime<Utc>, minutes: i32, status: AppointmentStatus) -> Appointment {
        let iv = Interval::from_start_duration(start, minutes);
        Appointment {
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            dentist_user_id: Uuid::new_v4(),
            start_at: iv.start,
            end_at: iv.end,
            duration_minutes: minutes,
            status,
            treatment_type: "checkup".into(),
            notes: None,
            created_by_user_id: Uuid::new_v4(),
            updated_by_user_id: Uuid::new_v4(),
            created_at: at(7, 0),
            updated_at: at(7, 0),
        }
    }

    #[test]
    fn overlapping_proposal_reports_the_existing_id() {
        let existing = booked(at(10, 0), 30, AppointmentStatus::Scheduled);
        let id = existing.appointment_id;
        let proposed = Interval::new(at(10, 15), at(10, 45));
        assert_eq!(first_conflict(proposed, None, &[existing]), Some(id));
    }

    #[test]
    fn touching_proposal_is_clean() {
        let existing = booked(at(10, 0), 30, AppointmentStatus::Confirmed);
        let proposed = Interval::new(at(10, 30), at(11, 0));
        assert_eq!(first_conflict(proposed, None, &[existing]), None);
    }

    #[test]
    fn excluded_record_cannot_conflict_with_itself() {
        let existing = booked(at(10, 0), 30, AppointmentStatus::Scheduled);
        let id = existing.appointment_id;
        // Shift by 15 minutes: only overlaps the record's own old interval.
        let proposed = Interval::new(at(10, 15), at(10, 45));
        assert_eq!(first_conflict(proposed, Some(id), &[existing]), None);
    }

    #[test]
    fn inactive_candidates_are_ignored() {
        let cancelled = booked(at(10, 0), 30, AppointmentStatus::Cancelled);
        let no_show = booked(at(10, 0), 30, AppointmentStatus::NoShow);
        let done = booked(at(10, 0), 30, AppointmentStatus::Completed);
        let proposed = Interval::new(at(10, 0), at(10, 30));
        assert_eq!(
            first_conflict(proposed, None, &[cancelled, no_show, done]),
            None
        );
    }

    #[test]
    fn earliest_overlapping_candidate_wins() {
        let a = booked(at(9, 0), 120, AppointmentStatus::Scheduled);
        let b = booked(at(10, 0), 30, AppointmentStatus::Scheduled);
        let first = a.appointment_id;
        let proposed = Interval::new(at(10, 0), at(10, 30));
        assert_eq!(first_conflict(proposed, None, &[a, b]), Some(first));
    }
}
