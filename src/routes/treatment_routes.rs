// src/routes/treatment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, ROLE_ADMIN, ROLE_DENTIST},
    scheduling::Transitions,
};

fn can_manage_treatments(auth: &AuthContext) -> bool {
    auth.role == ROLE_ADMIN || auth.role == ROLE_DENTIST
}

fn ensure_manage(auth: &AuthContext) -> Result<(), ApiError> {
    if can_manage_treatments(auth) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin/dentist can manage treatments".into(),
        ))
    }
}

/* ============================================================
   Status
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStatus {
    Planned = 0,
    InProgress = 1,
    Completed = 2,
    Cancelled = 3,
}

impl fmt::Display for TreatmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreatmentStatus::Planned => write!(f, "planned"),
            TreatmentStatus::InProgress => write!(f, "in_progress"),
            TreatmentStatus::Completed => write!(f, "completed"),
            TreatmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

const TREATMENT_TRANSITIONS: Transitions<TreatmentStatus> = Transitions::new(&[
    (TreatmentStatus::Planned, TreatmentStatus::InProgress),
    (TreatmentStatus::Planned, TreatmentStatus::Cancelled),
    (TreatmentStatus::InProgress, TreatmentStatus::Completed),
    (TreatmentStatus::InProgress, TreatmentStatus::Cancelled),
]);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/treatments", post(create_treatment).get(list_treatments))
        .route("/treatments/statistics", get(get_statistics))
        .route("/treatments/{treatment_id}", get(get_treatment).patch(patch_treatment))
        .route("/treatments/{treatment_id}/progress-notes", post(add_progress_note))
        .route("/treatments/patient/{patient_id}/history", get(get_patient_history))
}

/* ============================================================
   Row / DTO
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TreatmentRow {
    pub treatment_id: Uuid,
    pub patient_id: Uuid,
    pub dentist_user_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub treatment_type: String,
    pub description: String,
    pub status: TreatmentStatus,
    pub started_on: Option<NaiveDate>,
    pub ended_on: Option<NaiveDate>,
    pub total_cost_cents: i64,
    pub paid_amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const TREATMENT_COLUMNS: &str = r#"
    treatment_id, patient_id, dentist_user_id, appointment_id,
    treatment_type, description, status, started_on, ended_on,
    total_cost_cents, paid_amount_cents, created_at, updated_at
"#;

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/* ============================================================
   POST /treatments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateTreatmentRequest {
    pub patient_id: Uuid,
    pub dentist_user_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub treatment_type: String,
    pub description: String,
    pub started_on: Option<NaiveDate>,
    pub total_cost_cents: Option<i64>,
}

pub async fn create_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTreatmentRequest>,
) -> Result<Json<ApiOk<TreatmentRow>>, ApiError> {
    ensure_manage(&auth)?;

    let treatment_type = req.treatment_type.trim();
    let description = req.description.trim();
    if treatment_type.is_empty() || description.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "treatment_type and description are required".into(),
        ));
    }
    let total_cost_cents = req.total_cost_cents.unwrap_or(0);
    if total_cost_cents < 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "total_cost_cents must not be negative".into(),
        ));
    }

    let sql = format!(
        r#"
        INSERT INTO treatment (
            patient_id, dentist_user_id, appointment_id,
            treatment_type, description, status, started_on, total_cost_cents
        )
        VALUES ($1,$2,$3,$4,$5, 0, $6,$7)
        RETURNING {TREATMENT_COLUMNS}
        "#
    );

    let row: TreatmentRow = sqlx::query_as::<_, TreatmentRow>(&sql)
        .bind(req.patient_id)
        .bind(req.dentist_user_id)
        .bind(req.appointment_id)
        .bind(treatment_type)
        .bind(description)
        .bind(req.started_on)
        .bind(total_cost_cents)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::BadRequest("TREATMENT_CREATE_FAILED", format!("{e}")))?;

    Ok(Json(ApiOk { data: row }))
}

/* ============================================================
   GET /treatments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListTreatmentsQuery {
    pub patient_id: Option<Uuid>,
    pub dentist_user_id: Option<Uuid>,
    pub status: Option<TreatmentStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_treatments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListTreatmentsQuery>,
) -> Result<Json<ApiOk<Vec<TreatmentRow>>>, ApiError> {
    let _ = &auth; // any staff member may read treatments

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let sql = format!(
        r#"
        SELECT {TREATMENT_COLUMNS}
        FROM treatment
        WHERE ($1::uuid IS NULL OR patient_id = $1)
          AND ($2::uuid IS NULL OR dentist_user_id = $2)
          AND ($3::smallint IS NULL OR status = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#
    );

    let rows: Vec<TreatmentRow> = sqlx::query_as::<_, TreatmentRow>(&sql)
        .bind(q.patient_id)
        .bind(q.dentist_user_id)
        .bind(q.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

/* ============================================================
   GET /treatments/statistics
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCountRow {
    pub status: TreatmentStatus,
    pub count: i64,
    pub total_cost_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct TreatmentStatistics {
    pub by_status: Vec<StatusCountRow>,
    pub total_treatments: i64,
    pub total_billed_cents: i64,
    pub total_paid_cents: i64,
}

pub async fn get_statistics(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<TreatmentStatistics>>, ApiError> {
    let _ = &auth;

    let by_status: Vec<StatusCountRow> = sqlx::query_as::<_, StatusCountRow>(
        r#"
        SELECT status,
               COUNT(*) AS count,
               COALESCE(SUM(total_cost_cents), 0) AS total_cost_cents
        FROM treatment
        GROUP BY status
        ORDER BY status ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let totals: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(total_cost_cents), 0),
               COALESCE(SUM(paid_amount_cents), 0)
        FROM treatment
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: TreatmentStatistics {
            by_status,
            total_treatments: totals.0,
            total_billed_cents: totals.1,
            total_paid_cents: totals.2,
        },
    }))
}

/* ============================================================
   GET /treatments/{id}
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProgressNoteRow {
    pub progress_note_id: Uuid,
    pub treatment_id: Uuid,
    pub note: String,
    pub noted_by_user_id: Uuid,
    pub noted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TreatmentDetail {
    pub treatment: TreatmentRow,
    pub progress_notes: Vec<ProgressNoteRow>,
}

pub async fn get_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(treatment_id): Path<Uuid>,
) -> Result<Json<ApiOk<TreatmentDetail>>, ApiError> {
    let _ = &auth;

    let sql = format!(
        r#"
        SELECT {TREATMENT_COLUMNS}
        FROM treatment
        WHERE treatment_id = $1
        "#
    );
    let treatment: TreatmentRow = sqlx::query_as::<_, TreatmentRow>(&sql)
        .bind(treatment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "treatment not found".into()))?;

    let progress_notes: Vec<ProgressNoteRow> = sqlx::query_as::<_, ProgressNoteRow>(
        r#"
        SELECT progress_note_id, treatment_id, note, noted_by_user_id, noted_at
        FROM progress_note
        WHERE treatment_id = $1
        ORDER BY noted_at DESC
        "#,
    )
    .bind(treatment_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: TreatmentDetail {
            treatment,
            progress_notes,
        },
    }))
}

/* ============================================================
   PATCH /treatments/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchTreatmentRequest {
    pub description: Option<String>,
    pub status: Option<TreatmentStatus>,
    pub started_on: Option<NaiveDate>,
    pub ended_on: Option<NaiveDate>,
    pub total_cost_cents: Option<i64>,
    pub paid_amount_cents: Option<i64>,
}

pub async fn patch_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(treatment_id): Path<Uuid>,
    Json(req): Json<PatchTreatmentRequest>,
) -> Result<Json<ApiOk<TreatmentRow>>, ApiError> {
    ensure_manage(&auth)?;

    let sql = format!(
        r#"
        SELECT {TREATMENT_COLUMNS}
        FROM treatment
        WHERE treatment_id = $1
        "#
    );
    let existing: TreatmentRow = sqlx::query_as::<_, TreatmentRow>(&sql)
        .bind(treatment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "treatment not found".into()))?;

    if let Some(requested) = req.status {
        if requested != existing.status
            && !TREATMENT_TRANSITIONS.can_transition(existing.status, requested)
        {
            return Err(ApiError::BadRequest(
                "INVALID_STATUS_TRANSITION",
                format!("invalid status transition: {} -> {}", existing.status, requested),
            ));
        }
    }
    if req.total_cost_cents.is_some_and(|c| c < 0)
        || req.paid_amount_cents.is_some_and(|c| c < 0)
    {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "amounts must not be negative".into(),
        ));
    }

    // Completing a treatment stamps the end date unless one was supplied.
    let ended_on = match (req.ended_on, req.status) {
        (Some(d), _) => Some(d),
        (None, Some(TreatmentStatus::Completed)) => Some(Utc::now().date_naive()),
        _ => existing.ended_on,
    };

    let sql = format!(
        r#"
        UPDATE treatment
        SET description = COALESCE($2, description),
            status = COALESCE($3, status),
            started_on = COALESCE($4, started_on),
            ended_on = $5,
            total_cost_cents = COALESCE($6, total_cost_cents),
            paid_amount_cents = COALESCE($7, paid_amount_cents),
            updated_at = now()
        WHERE treatment_id = $1
        RETURNING {TREATMENT_COLUMNS}
        "#
    );

    let row: TreatmentRow = sqlx::query_as::<_, TreatmentRow>(&sql)
        .bind(treatment_id)
        .bind(req.description.as_deref().map(str::trim))
        .bind(req.status)
        .bind(req.started_on)
        .bind(ended_on)
        .bind(req.total_cost_cents)
        .bind(req.paid_amount_cents)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

/* ============================================================
   POST /treatments/{id}/progress-notes
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AddProgressNoteRequest {
    pub note: String,
}

pub async fn add_progress_note(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(treatment_id): Path<Uuid>,
    Json(req): Json<AddProgressNoteRequest>,
) -> Result<Json<ApiOk<ProgressNoteRow>>, ApiError> {
    ensure_manage(&auth)?;

    let note = req.note.trim();
    if note.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "note must not be empty".into(),
        ));
    }

    let exists: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT treatment_id
        FROM treatment
        WHERE treatment_id = $1
        "#,
    )
    .bind(treatment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if exists.is_none() {
        return Err(ApiError::NotFound("NOT_FOUND", "treatment not found".into()));
    }

    let row: ProgressNoteRow = sqlx::query_as::<_, ProgressNoteRow>(
        r#"
        INSERT INTO progress_note (treatment_id, note, noted_by_user_id)
        VALUES ($1, $2, $3)
        RETURNING progress_note_id, treatment_id, note, noted_by_user_id, noted_at
        "#,
    )
    .bind(treatment_id)
    .bind(note)
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

/* ============================================================
   GET /treatments/patient/{patient_id}/history
   ============================================================ */

pub async fn get_patient_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<TreatmentRow>>>, ApiError> {
    let _ = &auth;

    let sql = format!(
        r#"
        SELECT {TREATMENT_COLUMNS}
        FROM treatment
        WHERE patient_id = $1
        ORDER BY created_at DESC
        "#
    );

    let rows: Vec<TreatmentRow> = sqlx::query_as::<_, TreatmentRow>(&sql)
        .bind(patient_id)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use TreatmentStatus::*;

    #[test]
    fn planned_work_can_start_or_be_called_off() {
        assert!(TREATMENT_TRANSITIONS.can_transition(Planned, InProgress));
        assert!(TREATMENT_TRANSITIONS.can_transition(Planned, Cancelled));
        assert!(!TREATMENT_TRANSITIONS.can_transition(Planned, Completed));
    }

    #[test]
    fn finished_and_cancelled_treatments_are_terminal() {
        for to in [Planned, InProgress, Completed, Cancelled] {
            assert!(!TREATMENT_TRANSITIONS.can_transition(Completed, to));
            assert!(!TREATMENT_TRANSITIONS.can_transition(Cancelled, to));
        }
        assert!(TREATMENT_TRANSITIONS.is_terminal(Completed));
        assert!(TREATMENT_TRANSITIONS.is_terminal(Cancelled));
    }
}
