// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, ROLE_ADMIN, ROLE_ASSISTANT, ROLE_DENTIST, ROLE_RECEPTIONIST},
    scheduling::{AppointmentStatus, ProposedAppointment},
};

fn is_admin(auth: &AuthContext) -> bool {
    auth.role == ROLE_ADMIN
}
fn is_dentist(auth: &AuthContext) -> bool {
    auth.role == ROLE_DENTIST
}

fn can_manage_appointments(auth: &AuthContext) -> bool {
    is_admin(auth) || auth.role == ROLE_RECEPTIONIST || auth.role == ROLE_ASSISTANT
}

fn ensure_manage(auth: &AuthContext) -> Result<(), ApiError> {
    if can_manage_appointments(auth) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin/assistant/receptionist can manage appointments".into(),
        ))
    }
}

/// Dentists may only look at their own calendar; managing roles may look at
/// anyone's.
fn resolve_dentist_scope(
    auth: &AuthContext,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, ApiError> {
    if can_manage_appointments(auth) {
        return Ok(requested);
    }
    if is_dentist(auth) {
        if requested.is_some_and(|id| id != auth.user_id) {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Dentist can only view their own schedule".into(),
            ));
        }
        return Ok(Some(auth.user_id));
    }
    Err(ApiError::Forbidden(
        "FORBIDDEN",
        "You do not have permission to view schedules".into(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment).get(search_appointments))
        .route("/appointments/today", get(get_appointments_today))
        .route("/appointments/available-slots", get(get_available_slots))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(patch_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/status", patch(patch_appointment_status))
}

/* ============================================================
   Response DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct PersonBrief {
    pub id: Uuid,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub appointment_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub treatment_type: String,
    pub notes: Option<String>,
    pub patient: PersonBrief,
    pub dentist: PersonBrief,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentJoinRow {
    appointment_id: Uuid,
    patient_id: Uuid,
    dentist_user_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    duration_minutes: i32,
    status: AppointmentStatus,
    treatment_type: String,
    notes: Option<String>,
    p_first: String,
    p_last: String,
    d_display: String,
}

impl AppointmentJoinRow {
    fn into_dto(self) -> AppointmentDto {
        AppointmentDto {
            appointment_id: self.appointment_id,
            start_at: self.start_at,
            end_at: self.end_at,
            duration_minutes: self.duration_minutes,
            status: self.status,
            treatment_type: self.treatment_type,
            notes: self.notes,
            patient: PersonBrief {
                id: self.patient_id,
                display: format!("{} {}", self.p_first, self.p_last),
            },
            dentist: PersonBrief {
                id: self.dentist_user_id,
                display: self.d_display,
            },
        }
    }
}

const APPOINTMENT_JOIN_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.patient_id,
      a.dentist_user_id,
      a.start_at,
      a.end_at,
      a.duration_minutes,
      a.status,
      a.treatment_type,
      a.notes,

      p.first_name AS p_first,
      p.last_name  AS p_last,

      d.display_name AS d_display

    FROM appointment a
    JOIN patient p ON p.patient_id = a.patient_id
    JOIN clinic_user d ON d.user_id = a.dentist_user_id
"#;

async fn load_appointment_dto(
    state: &AppState,
    appointment_id: Uuid,
) -> Result<AppointmentDto, ApiError> {
    let sql = format!("{APPOINTMENT_JOIN_SELECT} WHERE a.appointment_id = $1");
    let row: AppointmentJoinRow = sqlx::query_as::<_, AppointmentJoinRow>(&sql)
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;

    Ok(row.into_dto())
}

/* ============================================================
   POST /appointments (create)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub dentist_user_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub treatment_type: String,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    ensure_manage(&auth)?;

    // Patient must exist and be active before the calendar is consulted.
    let patient_exists: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT patient_id
        FROM patient
        WHERE patient_id = $1
          AND is_active = true
        "#,
    )
    .bind(req.patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if patient_exists.is_none() {
        return Err(ApiError::NotFound("NOT_FOUND", "patient not found".into()));
    }

    let created = state
        .scheduling
        .propose(ProposedAppointment {
            patient_id: req.patient_id,
            dentist_user_id: req.dentist_user_id,
            start_at: req.start_at,
            duration_minutes: req.duration_minutes,
            treatment_type: req.treatment_type,
            notes: req.notes,
            created_by_user_id: auth.user_id,
        })
        .await?;

    let dto = load_appointment_dto(&state, created.appointment_id).await?;
    Ok(Json(ApiOk { data: dto }))
}

/* ============================================================
   GET /appointments (search)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SearchAppointmentsQuery {
    pub patient_id: Option<Uuid>,
    pub dentist_user_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn search_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<SearchAppointmentsQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    let dentist_user_id = resolve_dentist_scope(&auth, q.dentist_user_id)?;

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    // end_date is inclusive: filter on [start_date, end_date + 1 day)
    let from_ts = q
        .start_date
        .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).unwrap(), Utc));
    let to_ts = q
        .end_date
        .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).unwrap(), Utc))
        .map(|ts| ts + chrono::Duration::days(1));

    let sql = format!(
        r#"{APPOINTMENT_JOIN_SELECT}
        WHERE ($1::uuid IS NULL OR a.patient_id = $1)
          AND ($2::uuid IS NULL OR a.dentist_user_id = $2)
          AND ($3::smallint IS NULL OR a.status = $3)
          AND ($4::timestamptz IS NULL OR a.start_at >= $4)
          AND ($5::timestamptz IS NULL OR a.start_at < $5)
        ORDER BY a.start_at ASC
        LIMIT $6 OFFSET $7
        "#
    );

    let rows: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&sql)
        .bind(q.patient_id)
        .bind(dentist_user_id)
        .bind(q.status)
        .bind(from_ts)
        .bind(to_ts)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(AppointmentJoinRow::into_dto).collect(),
    }))
}

/* ============================================================
   GET /appointments/today
   ============================================================ */

pub async fn get_appointments_today(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    // Dentists get their own day; everyone else gets the whole clinic.
    let dentist_user_id = if is_dentist(&auth) {
        Some(auth.user_id)
    } else {
        None
    };

    let start = chrono::Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap();
    let start_ts = DateTime::<Utc>::from_naive_utc_and_offset(start, Utc);
    let end_ts = start_ts + chrono::Duration::days(1);

    let sql = format!(
        r#"{APPOINTMENT_JOIN_SELECT}
        WHERE a.start_at >= $1
          AND a.start_at < $2
          AND ($3::uuid IS NULL OR a.dentist_user_id = $3)
        ORDER BY a.start_at ASC
        "#
    );

    let rows: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&sql)
        .bind(start_ts)
        .bind(end_ts)
        .bind(dentist_user_id)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(AppointmentJoinRow::into_dto).collect(),
    }))
}

/* ============================================================
   GET /appointments/available-slots
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub dentist_user_id: Uuid,
    // YYYY-MM-DD
    pub date: String,
    pub slot_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SlotDto {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AvailableSlotsData {
    pub date: NaiveDate,
    pub slots: Vec<SlotDto>,
    pub total_slots: usize,
}

pub async fn get_available_slots(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AvailableSlotsQuery>,
) -> Result<Json<ApiOk<AvailableSlotsData>>, ApiError> {
    resolve_dentist_scope(&auth, Some(q.dentist_user_id))?;

    let date = NaiveDate::parse_from_str(q.date.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("VALIDATION_ERROR", "date must be YYYY-MM-DD".into())
    })?;

    let slots: Vec<SlotDto> = state
        .scheduling
        .available_slots(q.dentist_user_id, date, q.slot_minutes)
        .await?
        .iter()
        .map(|s| SlotDto {
            start_at: s.start,
            end_at: s.end,
        })
        .collect();

    Ok(Json(ApiOk {
        data: AvailableSlotsData {
            date,
            total_slots: slots.len(),
            slots,
        },
    }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let dto = load_appointment_dto(&state, appointment_id).await?;

    if is_dentist(&auth) && dto.dentist.id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Dentist can only view their own appointment".into(),
        ));
    }

    Ok(Json(ApiOk { data: dto }))
}

/* ============================================================
   PATCH /appointments/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchAppointmentRequest {
    pub start_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub treatment_type: Option<String>,
    pub notes: Option<Option<String>>,
}

pub async fn patch_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<PatchAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    ensure_manage(&auth)?;

    // Interval changes go through the scheduling service so the conflict
    // check (excluding this record) runs under the practitioner lock.
    if req.start_at.is_some() || req.duration_minutes.is_some() {
        state
            .scheduling
            .reschedule(appointment_id, req.start_at, req.duration_minutes, auth.user_id)
            .await?;
    }

    if req.treatment_type.is_some() || req.notes.is_some() {
        if let Some(t) = req.treatment_type.as_deref() {
            if t.trim().is_empty() {
                return Err(ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    "treatment_type must not be empty".into(),
                ));
            }
        }
        let res = sqlx::query(
            r#"
            UPDATE appointment
            SET treatment_type = COALESCE($2, treatment_type),
                notes = CASE WHEN $3 THEN $4 ELSE notes END,
                updated_at = now(),
                updated_by_user_id = $5
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .bind(req.treatment_type.as_deref().map(str::trim))
        .bind(req.notes.is_some())
        .bind(req.notes.clone().unwrap_or(None))
        .bind(auth.user_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

        if res.rows_affected() == 0 {
            return Err(ApiError::NotFound("NOT_FOUND", "appointment not found".into()));
        }
    }

    let dto = load_appointment_dto(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: dto }))
}

/* ============================================================
   PATCH /appointments/{id}/status
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchStatusRequest {
    pub status: AppointmentStatus,
}

pub async fn patch_appointment_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<PatchStatusRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    // Managing roles may transition anything; a dentist may transition
    // their own appointments (confirm, complete, no-show).
    if !can_manage_appointments(&auth) {
        if !is_dentist(&auth) {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "You do not have permission to update appointments".into(),
            ));
        }
        let dto = load_appointment_dto(&state, appointment_id).await?;
        if dto.dentist.id != auth.user_id {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Dentist can only update their own appointment".into(),
            ));
        }
    }

    state
        .scheduling
        .transition(appointment_id, req.status, auth.user_id)
        .await?;

    let dto = load_appointment_dto(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: dto }))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<crate::models::OkResponse>, ApiError> {
    ensure_manage(&auth)?;

    // Bookings that already spawned clinical records stay for the audit
    // trail even while still in scheduled status.
    let dependents: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM treatment
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if dependents > 0 {
        return Err(ApiError::BadRequest(
            "APPOINTMENT_HAS_RECORDS",
            format!("appointment has {dependents} linked treatment(s); it cannot be deleted"),
        ));
    }

    state.scheduling.delete(appointment_id).await?;

    Ok(Json(crate::models::OkResponse {
        data: crate::models::OkData { ok: true },
    }))
}
