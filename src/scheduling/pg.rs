// src/scheduling/pg.rs

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::ROLE_DENTIST;

use super::store::{
    Appointment, AppointmentStore, NewAppointment, PractitionerDirectory, StoreError,
};
use super::transitions::AppointmentStatus;

/// Postgres-backed appointment store. Overlap races that slip past the
/// in-process lock are caught by the `appointment_no_active_overlap`
/// exclusion constraint and surface as `StoreError::Conflict`.
pub struct PgAppointmentStore {
    pool: sqlx::PgPool,
}

impl PgAppointmentStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        PgAppointmentStore { pool }
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let row: Option<Appointment> = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT appointment_id, patient_id, dentist_user_id, start_at, end_at,
                   duration_minutes, status, treatment_type, notes,
                   created_by_user_id, updated_by_user_id, created_at, updated_at
            FROM appointment
            WHERE appointment_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_active_in_window(
        &self,
        dentist_user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let rows: Vec<Appointment> = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT appointment_id, patient_id, dentist_user_id, start_at, end_at,
                   duration_minutes, status, treatment_type, notes,
                   created_by_user_id, updated_by_user_id, created_at, updated_at
            FROM appointment
            WHERE dentist_user_id = $1
              AND start_at < $3
              AND end_at > $2
              AND status IN (0, 1)
            ORDER BY start_at ASC
            "#,
        )
        .bind(dentist_user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let end_at = new.start_at + Duration::minutes(new.duration_minutes as i64);

        let row: Appointment = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointment (
              patient_id,
              dentist_user_id,
              start_at,
              end_at,
              duration_minutes,
              status,
              treatment_type,
              notes,
              created_by_user_id,
              updated_by_user_id
            )
            VALUES ($1,$2,$3,$4,$5, 0, $6,$7,$8,$8)
            RETURNING appointment_id, patient_id, dentist_user_id, start_at, end_at,
                      duration_minutes, status, treatment_type, notes,
                      created_by_user_id, updated_by_user_id, created_at, updated_at
            "#,
        )
        .bind(new.patient_id)
        .bind(new.dentist_user_id)
        .bind(new.start_at)
        .bind(end_at)
        .bind(new.duration_minutes)
        .bind(&new.treatment_type)
        .bind(new.notes.as_deref())
        .bind(new.created_by_user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_interval(
        &self,
        id: Uuid,
        start_at: DateTime<Utc>,
        duration_minutes: i32,
        updated_by: Uuid,
    ) -> Result<Option<Appointment>, StoreError> {
        let end_at = start_at + Duration::minutes(duration_minutes as i64);

        let row: Option<Appointment> = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointment
            SET start_at = $2,
                end_at = $3,
                duration_minutes = $4,
                updated_at = now(),
                updated_by_user_id = $5
            WHERE appointment_id = $1
            RETURNING appointment_id, patient_id, dentist_user_id, start_at, end_at,
                      duration_minutes, status, treatment_type, notes,
                      created_by_user_id, updated_by_user_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(start_at)
        .bind(end_at)
        .bind(duration_minutes)
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
        updated_by: Uuid,
    ) -> Result<Option<Appointment>, StoreError> {
        let row: Option<Appointment> = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointment
            SET status = $2,
                updated_at = now(),
                updated_by_user_id = $3
            WHERE appointment_id = $1
            RETURNING appointment_id, patient_id, dentist_user_id, start_at, end_at,
                      duration_minutes, status, treatment_type, notes,
                      created_by_user_id, updated_by_user_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(r#"DELETE FROM appointment WHERE appointment_id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl PractitionerDirectory for PgAppointmentStore {
    async fn exists(&self, dentist_user_id: Uuid) -> Result<bool, StoreError> {
        let found: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT user_id
            FROM clinic_user
            WHERE user_id = $1
              AND role = $2
              AND is_active = true
            "#,
        )
        .bind(dentist_user_id)
        .bind(ROLE_DENTIST)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}
