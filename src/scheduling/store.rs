// src/scheduling/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::interval::Interval;
use super::transitions::AppointmentStatus;

/// A booked appointment as persisted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub dentist_user_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub treatment_type: String,
    pub notes: Option<String>,
    pub created_by_user_id: Uuid,
    pub updated_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_at, self.end_at)
    }
}

/// Fields for a fresh booking. The store derives `end_at` and writes the
/// record in `scheduled` status.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub dentist_user_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub treatment_type: String,
    pub notes: Option<String>,
    pub created_by_user_id: Uuid,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A write tripped the active-overlap constraint: another writer won
    /// the interval between our conflict check and the write.
    #[error("overlapping active appointment")]
    Conflict,
    #[error("store failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.constraint() == Some("appointment_no_active_overlap") {
                return StoreError::Conflict;
            }
        }
        StoreError::Backend(e.to_string())
    }
}

/// Narrow persistence capability the scheduling core reasons over.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Active (`scheduled`/`confirmed`) appointments for one practitioner
    /// whose interval overlaps the half-open window `[from, to)`, ordered by
    /// start time.
    async fn find_active_in_window(
        &self,
        dentist_user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn insert(&self, new: NewAppointment) -> Result<Appointment, StoreError>;

    /// Move an appointment to a new interval. `None` if the id is unknown.
    async fn update_interval(
        &self,
        id: Uuid,
        start_at: DateTime<Utc>,
        duration_minutes: i32,
        updated_by: Uuid,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Set the status field. `None` if the id is unknown. Legality of the
    /// transition is the scheduling service's concern, not the store's.
    async fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
        updated_by: Uuid,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Physically remove a record. `false` if the id is unknown.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Lookup used to validate slot queries before touching the calendar.
#[async_trait]
pub trait PractitionerDirectory: Send + Sync {
    async fn exists(&self, dentist_user_id: Uuid) -> Result<bool, StoreError>;
}
