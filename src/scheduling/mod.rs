// src/scheduling/mod.rs
//
// Appointment scheduling engine: a pure interval/conflict/slot/lifecycle
// core with persistence injected through the store traits. Nothing in here
// runs SQL except the `pg` adapter.

pub mod conflict;
pub mod interval;
pub mod pg;
pub mod service;
pub mod slots;
pub mod store;
pub mod transitions;

pub use interval::Interval;
pub use pg::PgAppointmentStore;
pub use service::{ClinicHours, ProposedAppointment, ScheduleError, SchedulingService};
pub use store::{Appointment, AppointmentStore, NewAppointment, PractitionerDirectory, StoreError};
pub use transitions::{APPOINTMENT_TRANSITIONS, AppointmentStatus, Transitions};
