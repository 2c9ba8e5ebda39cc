// src/scheduling/service.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::conflict::first_conflict;
use super::interval::Interval;
use super::slots::slot_grid;
use super::store::{
    Appointment, AppointmentStore, NewAppointment, PractitionerDirectory, StoreError,
};
use super::transitions::{APPOINTMENT_TRANSITIONS, AppointmentStatus};

// Clinic policy bounds.
pub const MIN_APPOINTMENT_MINUTES: i32 = 15;
pub const MAX_APPOINTMENT_MINUTES: i32 = 480;
pub const MIN_SLOT_MINUTES: i32 = 15;
pub const MAX_SLOT_MINUTES: i32 = 120;

/// Daily working window for slot generation.
#[derive(Debug, Clone, Copy)]
pub struct ClinicHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub default_slot_minutes: i32,
}

impl Default for ClinicHours {
    fn default() -> Self {
        ClinicHours {
            open: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            default_slot_minutes: 30,
        }
    }
}

impl ClinicHours {
    /// Working window for one calendar day. Timestamps are stored as UTC;
    /// local rendering belongs to the frontend.
    pub fn window_for(&self, date: NaiveDate) -> Interval {
        Interval::new(
            DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(self.open), Utc),
            DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(self.close), Utc),
        )
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),
    #[error("dentist {0} not found or not active")]
    PractitionerNotFound(Uuid),
    #[error("appointment {0} not found")]
    AppointmentNotFound(Uuid),
    #[error("requested time conflicts with appointment {existing}")]
    Conflict { existing: Uuid },
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A booking request as it arrives from the API layer, authorization
/// already resolved by the caller.
#[derive(Debug, Clone)]
pub struct ProposedAppointment {
    pub patient_id: Uuid,
    pub dentist_user_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub treatment_type: String,
    pub notes: Option<String>,
    pub created_by_user_id: Uuid,
}

/// One async mutex per practitioner. Check-then-write for a calendar is not
/// atomic on its own; every mutation of a practitioner's bookings runs under
/// this guard (the table's exclusion constraint backstops other processes).
#[derive(Default)]
struct PractitionerLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PractitionerLocks {
    async fn acquire(&self, dentist_user_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(dentist_user_id).or_default().clone()
        };
        slot.lock_owned().await
    }
}

/// Orchestrates booking, rescheduling, slot listing and lifecycle
/// transitions over injected store collaborators.
pub struct SchedulingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn PractitionerDirectory>,
    hours: ClinicHours,
    locks: PractitionerLocks,
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn PractitionerDirectory>,
        hours: ClinicHours,
    ) -> Self {
        SchedulingService {
            store,
            directory,
            hours,
            locks: PractitionerLocks::default(),
        }
    }

    /// Book a new appointment. Created in `scheduled` status after the
    /// conflict check passes.
    pub async fn propose(&self, req: ProposedAppointment) -> Result<Appointment, ScheduleError> {
        validate_duration(req.duration_minutes)?;
        if req.treatment_type.trim().is_empty() {
            return Err(ScheduleError::Validation(
                "treatment_type is required".into(),
            ));
        }
        if !self.directory.exists(req.dentist_user_id).await? {
            return Err(ScheduleError::PractitionerNotFound(req.dentist_user_id));
        }

        let proposed = Interval::from_start_duration(req.start_at, req.duration_minutes);
        let _guard = self.locks.acquire(req.dentist_user_id).await;
        self.ensure_free(req.dentist_user_id, proposed, None).await?;

        let new = NewAppointment {
            patient_id: req.patient_id,
            dentist_user_id: req.dentist_user_id,
            start_at: req.start_at,
            duration_minutes: req.duration_minutes,
            treatment_type: req.treatment_type.trim().to_string(),
            notes: req.notes,
            created_by_user_id: req.created_by_user_id,
        };
        match self.store.insert(new).await {
            Ok(appointment) => Ok(appointment),
            Err(StoreError::Conflict) => {
                Err(self.lost_race(req.dentist_user_id, proposed, None).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move an existing appointment, keeping current values for any field
    /// not supplied. The record is excluded from its own conflict check.
    pub async fn reschedule(
        &self,
        id: Uuid,
        new_start: Option<DateTime<Utc>>,
        new_duration: Option<i32>,
        updated_by: Uuid,
    ) -> Result<Appointment, ScheduleError> {
        if let Some(duration) = new_duration {
            validate_duration(duration)?;
        }

        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(ScheduleError::AppointmentNotFound(id))?;

        let start_at = new_start.unwrap_or(current.start_at);
        let duration_minutes = new_duration.unwrap_or(current.duration_minutes);

        let proposed = Interval::from_start_duration(start_at, duration_minutes);
        let _guard = self.locks.acquire(current.dentist_user_id).await;
        self.ensure_free(current.dentist_user_id, proposed, Some(id))
            .await?;

        match self
            .store
            .update_interval(id, start_at, duration_minutes, updated_by)
            .await
        {
            Ok(Some(appointment)) => Ok(appointment),
            Ok(None) => Err(ScheduleError::AppointmentNotFound(id)),
            Err(StoreError::Conflict) => Err(self
                .lost_race(current.dentist_user_id, proposed, Some(id))
                .await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Bookable slots for one practitioner on one calendar day.
    pub async fn available_slots(
        &self,
        dentist_user_id: Uuid,
        date: NaiveDate,
        slot_minutes: Option<i32>,
    ) -> Result<Vec<Interval>, ScheduleError> {
        let slot_minutes = slot_minutes.unwrap_or(self.hours.default_slot_minutes);
        if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&slot_minutes) {
            return Err(ScheduleError::Validation(format!(
                "slot duration must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES} minutes"
            )));
        }
        if !self.directory.exists(dentist_user_id).await? {
            return Err(ScheduleError::PractitionerNotFound(dentist_user_id));
        }

        let window = self.hours.window_for(date);
        let busy: Vec<Interval> = self
            .store
            .find_active_in_window(dentist_user_id, window.start, window.end)
            .await?
            .iter()
            .map(Appointment::interval)
            .collect();

        Ok(slot_grid(window, slot_minutes, &busy))
    }

    /// Apply a lifecycle transition. Re-opening a cancelled or no-show
    /// booking makes it active again, so that edge re-enters conflict
    /// checking: the calendar may have been rebooked in the meantime.
    pub async fn transition(
        &self,
        id: Uuid,
        requested: AppointmentStatus,
        updated_by: Uuid,
    ) -> Result<Appointment, ScheduleError> {
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(ScheduleError::AppointmentNotFound(id))?;

        if !APPOINTMENT_TRANSITIONS.can_transition(current.status, requested) {
            return Err(ScheduleError::InvalidTransition {
                from: current.status,
                to: requested,
            });
        }

        let reactivating = requested.is_active() && !current.status.is_active();
        let _guard = self.locks.acquire(current.dentist_user_id).await;
        if reactivating {
            self.ensure_free(current.dentist_user_id, current.interval(), Some(id))
                .await?;
        }

        match self.store.update_status(id, requested, updated_by).await {
            Ok(Some(appointment)) => Ok(appointment),
            Ok(None) => Err(ScheduleError::AppointmentNotFound(id)),
            Err(StoreError::Conflict) => Err(self
                .lost_race(current.dentist_user_id, current.interval(), Some(id))
                .await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a booking outright. Allowed only while still `scheduled`;
    /// later states are kept for audit history.
    pub async fn delete(&self, id: Uuid) -> Result<(), ScheduleError> {
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(ScheduleError::AppointmentNotFound(id))?;

        if current.status != AppointmentStatus::Scheduled {
            return Err(ScheduleError::Validation(format!(
                "only scheduled appointments can be deleted (status is {})",
                current.status
            )));
        }

        if !self.store.delete(id).await? {
            return Err(ScheduleError::AppointmentNotFound(id));
        }
        Ok(())
    }

    async fn ensure_free(
        &self,
        dentist_user_id: Uuid,
        proposed: Interval,
        exclude: Option<Uuid>,
    ) -> Result<(), ScheduleError> {
        let candidates = self
            .store
            .find_active_in_window(dentist_user_id, proposed.start, proposed.end)
            .await?;
        match first_conflict(proposed, exclude, &candidates) {
            Some(existing) => Err(ScheduleError::Conflict { existing }),
            None => Ok(()),
        }
    }

    /// A write tripped the store's overlap constraint after our check
    /// passed: another process won the interval. Re-read to name the winner.
    async fn lost_race(
        &self,
        dentist_user_id: Uuid,
        proposed: Interval,
        exclude: Option<Uuid>,
    ) -> Result<ScheduleError, ScheduleError> {
        let candidates = self
            .store
            .find_active_in_window(dentist_user_id, proposed.start, proposed.end)
            .await?;
        Ok(match first_conflict(proposed, exclude, &candidates) {
            Some(existing) => ScheduleError::Conflict { existing },
            None => ScheduleError::Store(StoreError::Conflict),
        })
    }
}

fn validate_duration(duration_minutes: i32) -> Result<(), ScheduleError> {
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&duration_minutes) {
        return Err(ScheduleError::Validation(format!(
            "duration must be between {MIN_APPOINTMENT_MINUTES} and {MAX_APPOINTMENT_MINUTES} minutes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, min, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    /// Store double backed by a Vec; good enough to exercise every service
    /// path without a database.
    #[derive(Default)]
    struct MemStore {
        rows: StdMutex<Vec<Appointment>>,
    }

    #[async_trait]
    impl AppointmentStore for MemStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.appointment_id == id)
                .cloned())
        }

        async fn find_active_in_window(
            &self,
            dentist_user_id: Uuid,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Appointment>, StoreError> {
            let probe = Interval::new(from, to);
            let mut hits: Vec<Appointment> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.dentist_user_id == dentist_user_id)
                .filter(|a| a.status.is_active())
                .filter(|a| a.interval().overlaps(&probe))
                .cloned()
                .collect();
            hits.sort_by_key(|a| a.start_at);
            Ok(hits)
        }

        async fn insert(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
            let iv = Interval::from_start_duration(new.start_at, new.duration_minutes);
            let appointment = Appointment {
                appointment_id: Uuid::new_v4(),
                patient_id: new.patient_id,
                dentist_user_id: new.dentist_user_id,
                start_at: iv.start,
                end_at: iv.end,
                duration_minutes: new.duration_minutes,
                status: AppointmentStatus::Scheduled,
                treatment_type: new.treatment_type,
                notes: new.notes,
                created_by_user_id: new.created_by_user_id,
                updated_by_user_id: new.created_by_user_id,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(appointment.clone());
            Ok(appointment)
        }

        async fn update_interval(
            &self,
            id: Uuid,
            start_at: DateTime<Utc>,
            duration_minutes: i32,
            updated_by: Uuid,
        ) -> Result<Option<Appointment>, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.iter_mut().find(|a| a.appointment_id == id) else {
                return Ok(None);
            };
            let iv = Interval::from_start_duration(start_at, duration_minutes);
            row.start_at = iv.start;
            row.end_at = iv.end;
            row.duration_minutes = duration_minutes;
            row.updated_by_user_id = updated_by;
            row.updated_at = Utc::now();
            Ok(Some(row.clone()))
        }

        async fn update_status(
            &self,
            id: Uuid,
            status: AppointmentStatus,
            updated_by: Uuid,
        ) -> Result<Option<Appointment>, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.iter_mut().find(|a| a.appointment_id == id) else {
                return Ok(None);
            };
            row.status = status;
            row.updated_by_user_id = updated_by;
            row.updated_at = Utc::now();
            Ok(Some(row.clone()))
        }

        async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|a| a.appointment_id != id);
            Ok(rows.len() < before)
        }
    }

    struct FixedDirectory {
        known: Vec<Uuid>,
    }

    #[async_trait]
    impl PractitionerDirectory for FixedDirectory {
        async fn exists(&self, dentist_user_id: Uuid) -> Result<bool, StoreError> {
            Ok(self.known.contains(&dentist_user_id))
        }
    }

    fn service_with(dentists: &[Uuid]) -> SchedulingService {
        SchedulingService::new(
            Arc::new(MemStore::default()),
            Arc::new(FixedDirectory {
                known: dentists.to_vec(),
            }),
            ClinicHours::default(),
        )
    }

    fn request(dentist: Uuid, start: DateTime<Utc>, minutes: i32) -> ProposedAppointment {
        ProposedAppointment {
            patient_id: Uuid::new_v4(),
            dentist_user_id: dentist,
            start_at: start,
            duration_minutes: minutes,
            treatment_type: "cleaning".into(),
            notes: None,
            created_by_user_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn overlapping_proposal_is_rejected_with_the_existing_id() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let existing = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        let err = svc
            .propose(request(dentist, at(10, 15), 30))
            .await
            .unwrap_err();
        match err {
            ScheduleError::Conflict { existing: id } => {
                assert_eq!(id, existing.appointment_id)
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn back_to_back_proposal_is_accepted() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        let second = svc.propose(request(dentist, at(10, 30), 30)).await.unwrap();
        assert_eq!(second.start_at, at(10, 30));
        assert_eq!(second.status, AppointmentStatus::Scheduled);
    }

    #[tokio::test]
    async fn other_practitioners_calendar_does_not_conflict() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let svc = service_with(&[first, second]);

        svc.propose(request(first, at(10, 0), 30)).await.unwrap();
        svc.propose(request(second, at(10, 0), 30)).await.unwrap();
    }

    #[tokio::test]
    async fn duration_bounds_are_enforced_before_store_access() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        for minutes in [14, 481, 0, -30] {
            let err = svc
                .propose(request(dentist, at(10, 0), minutes))
                .await
                .unwrap_err();
            assert!(matches!(err, ScheduleError::Validation(_)), "{minutes}");
        }
        svc.propose(request(dentist, at(8, 0), 15)).await.unwrap();
        svc.propose(request(dentist, at(9, 0), 480)).await.unwrap();
    }

    #[tokio::test]
    async fn blank_treatment_type_is_rejected() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let mut req = request(dentist, at(10, 0), 30);
        req.treatment_type = "   ".into();
        let err = svc.propose(req).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_dentist_is_not_found() {
        let svc = service_with(&[]);
        let ghost = Uuid::new_v4();

        let err = svc.propose(request(ghost, at(10, 0), 30)).await.unwrap_err();
        assert!(matches!(err, ScheduleError::PractitionerNotFound(id) if id == ghost));

        let err = svc.available_slots(ghost, day(), None).await.unwrap_err();
        assert!(matches!(err, ScheduleError::PractitionerNotFound(id) if id == ghost));
    }

    #[tokio::test]
    async fn end_minus_start_equals_duration_after_create_and_update() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let created = svc.propose(request(dentist, at(10, 0), 45)).await.unwrap();
        assert_eq!(
            created.end_at - created.start_at,
            chrono::Duration::minutes(created.duration_minutes as i64)
        );

        let moved = svc
            .reschedule(created.appointment_id, Some(at(13, 0)), Some(60), created.created_by_user_id)
            .await
            .unwrap();
        assert_eq!(moved.duration_minutes, 60);
        assert_eq!(
            moved.end_at - moved.start_at,
            chrono::Duration::minutes(60)
        );
    }

    #[tokio::test]
    async fn reschedule_does_not_conflict_with_itself() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let created = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        // New interval only overlaps the record's own old interval.
        let moved = svc
            .reschedule(created.appointment_id, Some(at(10, 15)), None, created.created_by_user_id)
            .await
            .unwrap();
        assert_eq!(moved.start_at, at(10, 15));
        assert_eq!(moved.end_at, at(10, 45));
    }

    #[tokio::test]
    async fn reschedule_into_another_booking_is_rejected() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let victim = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        let mover = svc.propose(request(dentist, at(14, 0), 30)).await.unwrap();

        let err = svc
            .reschedule(mover.appointment_id, Some(at(10, 15)), None, mover.created_by_user_id)
            .await
            .unwrap_err();
        match err {
            ScheduleError::Conflict { existing } => assert_eq!(existing, victim.appointment_id),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_day_has_twenty_half_hour_slots() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let slots = svc.available_slots(dentist, day(), Some(30)).await.unwrap();
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0].start, at(8, 0));
        assert_eq!(slots[19].end, at(18, 0));
    }

    #[tokio::test]
    async fn booked_grid_slot_disappears_from_the_listing() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        svc.propose(request(dentist, at(9, 0), 30)).await.unwrap();
        let slots = svc.available_slots(dentist, day(), Some(30)).await.unwrap();
        assert_eq!(slots.len(), 19);
        assert!(!slots.iter().any(|s| s.start == at(9, 0)));
    }

    #[tokio::test]
    async fn cancelled_booking_frees_its_slot() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let appt = svc.propose(request(dentist, at(9, 0), 30)).await.unwrap();
        svc.transition(appt.appointment_id, AppointmentStatus::Cancelled, appt.created_by_user_id)
            .await
            .unwrap();
        let slots = svc.available_slots(dentist, day(), Some(30)).await.unwrap();
        assert_eq!(slots.len(), 20);
    }

    #[tokio::test]
    async fn out_of_range_slot_duration_is_rejected() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        for minutes in [10, 125] {
            let err = svc
                .available_slots(dentist, day(), Some(minutes))
                .await
                .unwrap_err();
            assert!(matches!(err, ScheduleError::Validation(_)), "{minutes}");
        }
    }

    #[tokio::test]
    async fn illegal_transition_names_both_states() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);

        let appt = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        let err = svc
            .transition(appt.appointment_id, AppointmentStatus::Completed, appt.created_by_user_id)
            .await
            .unwrap_err();
        match err {
            ScheduleError::InvalidTransition { from, to } => {
                assert_eq!(from, AppointmentStatus::Scheduled);
                assert_eq!(to, AppointmentStatus::Completed);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_lifecycle_walk() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);
        let actor = Uuid::new_v4();

        let appt = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        let id = appt.appointment_id;
        let confirmed = svc
            .transition(id, AppointmentStatus::Confirmed, actor)
            .await
            .unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        let done = svc
            .transition(id, AppointmentStatus::Completed, actor)
            .await
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        // Terminal: nothing leaves completed.
        for target in AppointmentStatus::ALL {
            let err = svc.transition(id, target, actor).await.unwrap_err();
            assert!(matches!(err, ScheduleError::InvalidTransition { .. }));
        }
    }

    #[tokio::test]
    async fn reopening_a_cancelled_booking_rechecks_the_calendar() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);
        let actor = Uuid::new_v4();

        let original = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        svc.transition(original.appointment_id, AppointmentStatus::Cancelled, actor)
            .await
            .unwrap();

        // The freed slot gets rebooked...
        let usurper = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();

        // ...so re-opening the original must now collide with the usurper.
        let err = svc
            .transition(original.appointment_id, AppointmentStatus::Scheduled, actor)
            .await
            .unwrap_err();
        match err {
            ScheduleError::Conflict { existing } => assert_eq!(existing, usurper.appointment_id),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_is_scheduled_only() {
        let dentist = Uuid::new_v4();
        let svc = service_with(&[dentist]);
        let actor = Uuid::new_v4();

        let keep = svc.propose(request(dentist, at(10, 0), 30)).await.unwrap();
        svc.transition(keep.appointment_id, AppointmentStatus::Confirmed, actor)
            .await
            .unwrap();
        let err = svc.delete(keep.appointment_id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));

        let gone = svc.propose(request(dentist, at(11, 0), 30)).await.unwrap();
        svc.delete(gone.appointment_id).await.unwrap();
        let err = svc.delete(gone.appointment_id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::AppointmentNotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_proposals_for_the_same_interval_admit_exactly_one() {
        let dentist = Uuid::new_v4();
        let svc = Arc::new(service_with(&[dentist]));

        let a = tokio::spawn({
            let svc = svc.clone();
            async move { svc.propose(request(dentist, at(10, 0), 30)).await }
        });
        let b = tokio::spawn({
            let svc = svc.clone();
            async move { svc.propose(request(dentist, at(10, 15), 30)).await }
        });

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ScheduleError::Conflict { .. }))));
    }
}
