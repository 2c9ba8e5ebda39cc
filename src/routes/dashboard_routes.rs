// src/routes/dashboard_routes.rs

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
    scheduling::AppointmentStatus,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/stats", get(get_stats))
        .route("/dashboard/appointments", get(get_appointments))
        .route("/dashboard/revenue", get(get_revenue))
}

/* ============================================================
   Shared row shapes
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AppointmentBrief {
    pub appointment_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub treatment_type: String,
    pub patient_display: String,
    pub dentist_display: String,
}

const APPOINTMENT_BRIEF_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.start_at,
      a.end_at,
      a.status,
      a.treatment_type,
      p.first_name || ' ' || p.last_name AS patient_display,
      d.display_name AS dentist_display
    FROM appointment a
    JOIN patient p ON p.patient_id = a.patient_id
    JOIN clinic_user d ON d.user_id = a.dentist_user_id
"#;

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/* ============================================================
   GET /dashboard/stats
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TreatmentBrief {
    pub treatment_id: Uuid,
    pub treatment_type: String,
    pub total_cost_cents: i64,
    pub patient_display: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_patients: i64,
    pub today_appointments: i64,
    pub pending_appointments: i64,
    pub monthly_revenue_cents: i64,
    pub upcoming_appointments: Vec<AppointmentBrief>,
    pub in_progress_treatments: Vec<TreatmentBrief>,
}

pub async fn get_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<DashboardStats>>, ApiError> {
    let _ = &auth; // the dashboard is visible to every staff role

    let today = Utc::now().date_naive();
    let today_start =
        DateTime::<Utc>::from_naive_utc_and_offset(today.and_hms_opt(0, 0, 0).unwrap(), Utc);
    let tomorrow_start = today_start + chrono::Duration::days(1);
    let month_start = DateTime::<Utc>::from_naive_utc_and_offset(
        today.with_day(1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        Utc,
    );

    let total_patients: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM patient
        WHERE is_active = true
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let today_appointments: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE start_at >= $1
          AND start_at < $2
          AND status IN (0, 1)
        "#,
    )
    .bind(today_start)
    .bind(tomorrow_start)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let pending_appointments: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE start_at >= $1
          AND status IN (0, 1)
        "#,
    )
    .bind(tomorrow_start)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    // Money actually received this month, not just invoiced.
    let monthly_revenue_cents: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0)
        FROM payment
        WHERE paid_at >= $1
        "#,
    )
    .bind(month_start)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let sql = format!(
        r#"{APPOINTMENT_BRIEF_SELECT}
        WHERE a.start_at >= $1
          AND a.status IN (0, 1)
        ORDER BY a.start_at ASC
        LIMIT 5
        "#
    );
    let upcoming_appointments: Vec<AppointmentBrief> =
        sqlx::query_as::<_, AppointmentBrief>(&sql)
            .bind(today_start)
            .fetch_all(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let in_progress_treatments: Vec<TreatmentBrief> = sqlx::query_as::<_, TreatmentBrief>(
        r#"
        SELECT
          t.treatment_id,
          t.treatment_type,
          t.total_cost_cents,
          p.first_name || ' ' || p.last_name AS patient_display
        FROM treatment t
        JOIN patient p ON p.patient_id = t.patient_id
        WHERE t.status = 1
        ORDER BY t.created_at DESC
        LIMIT 5
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: DashboardStats {
            total_patients,
            today_appointments,
            pending_appointments,
            monthly_revenue_cents,
            upcoming_appointments,
            in_progress_treatments,
        },
    }))
}

/* ============================================================
   GET /dashboard/appointments
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct DashboardAppointmentsQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i64>,
}

pub async fn get_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<DashboardAppointmentsQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentBrief>>>, ApiError> {
    let _ = &auth;

    let date = q.date.unwrap_or_else(|| Utc::now().date_naive());
    let day_start =
        DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0).unwrap(), Utc);
    let day_end = day_start + chrono::Duration::days(1);
    let limit = q.limit.unwrap_or(10).clamp(1, 100);

    let sql = format!(
        r#"{APPOINTMENT_BRIEF_SELECT}
        WHERE a.start_at >= $1
          AND a.start_at < $2
          AND ($3::smallint IS NULL OR a.status = $3)
        ORDER BY a.start_at ASC
        LIMIT $4
        "#
    );

    let rows: Vec<AppointmentBrief> = sqlx::query_as::<_, AppointmentBrief>(&sql)
        .bind(day_start)
        .bind(day_end)
        .bind(q.status)
        .bind(limit)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

/* ============================================================
   GET /dashboard/revenue
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct RevenueQuery {
    pub months: Option<i32>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MonthlyRevenueRow {
    pub month: NaiveDate,
    pub revenue_cents: i64,
    pub payment_count: i64,
}

pub async fn get_revenue(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<RevenueQuery>,
) -> Result<Json<ApiOk<Vec<MonthlyRevenueRow>>>, ApiError> {
    let _ = &auth;

    let months = q.months.unwrap_or(6).clamp(1, 24);

    let rows: Vec<MonthlyRevenueRow> = sqlx::query_as::<_, MonthlyRevenueRow>(
        r#"
        SELECT
          date_trunc('month', paid_at)::date AS month,
          COALESCE(SUM(amount_cents), 0) AS revenue_cents,
          COUNT(*) AS payment_count
        FROM payment
        WHERE paid_at >= date_trunc('month', now()) - ($1 - 1) * interval '1 month'
        GROUP BY 1
        ORDER BY 1 ASC
        "#,
    )
    .bind(months)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}
