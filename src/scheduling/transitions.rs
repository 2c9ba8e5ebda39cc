// src/scheduling/transitions.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge-table state machine.
///
/// One abstraction for every status-bearing entity (appointments here,
/// invoices in the billing routes) instead of per-entity lookup maps.
pub struct Transitions<S: 'static> {
    edges: &'static [(S, S)],
}

impl<S: Copy + PartialEq> Transitions<S> {
    pub const fn new(edges: &'static [(S, S)]) -> Self {
        Transitions { edges }
    }

    /// True iff `from -> to` is a listed edge.
    pub fn can_transition(&self, from: S, to: S) -> bool {
        self.edges.iter().any(|&(f, t)| f == from && t == to)
    }

    /// True iff the state has no outgoing edges.
    pub fn is_terminal(&self, state: S) -> bool {
        !self.edges.iter().any(|&(f, _)| f == state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
    NoShow = 4,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Active appointments count toward conflict detection.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Legal appointment lifecycle. `completed` is the only true terminal
/// state; cancelled and no-show bookings may be re-opened.
pub const APPOINTMENT_TRANSITIONS: Transitions<AppointmentStatus> = Transitions::new(&[
    (AppointmentStatus::Scheduled, AppointmentStatus::Confirmed),
    (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled),
    (AppointmentStatus::Confirmed, AppointmentStatus::Completed),
    (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled),
    (AppointmentStatus::Confirmed, AppointmentStatus::NoShow),
    (AppointmentStatus::Cancelled, AppointmentStatus::Scheduled),
    (AppointmentStatus::NoShow, AppointmentStatus::Scheduled),
]);

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn transition_table_is_exactly_the_allowed_edges() {
        let allowed = [
            (Scheduled, Confirmed),
            (Scheduled, Cancelled),
            (Confirmed, Completed),
            (Confirmed, Cancelled),
            (Confirmed, NoShow),
            (Cancelled, Scheduled),
            (NoShow, Scheduled),
        ];
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    APPOINTMENT_TRANSITIONS.can_transition(from, to),
                    expected,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn completed_is_the_only_terminal_state() {
        for status in AppointmentStatus::ALL {
            assert_eq!(
                APPOINTMENT_TRANSITIONS.is_terminal(status),
                status == Completed,
                "{status}"
            );
        }
    }

    #[test]
    fn only_scheduled_and_confirmed_are_active() {
        assert!(Scheduled.is_active());
        assert!(Confirmed.is_active());
        assert!(!Completed.is_active());
        assert!(!Cancelled.is_active());
        assert!(!NoShow.is_active());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&NoShow).unwrap(), "\"no_show\"");
        assert_eq!(
            serde_json::from_str::<AppointmentStatus>("\"confirmed\"").unwrap(),
            Confirmed
        );
    }
}
