// src/routes/patient_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::AppState,
};

use serde::de::Deserializer;

fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // This is called only when the field is present (even if it's `null`).
    // - null => Option::<T>::deserialize => None => we wrap => Some(None)
    // - value => Some(value) => we wrap => Some(Some(value))
    let inner = Option::<T>::deserialize(deserializer)?;
    Ok(Some(inner))
}

fn ensure_staff(auth: &AuthContext) -> Result<(), ApiError> {
    // Every staff role works with patient records; there is no patient
    // self-service portal in this system.
    let _ = auth;
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient).get(search_patients))
        .route(
            "/patients/{patient_id}",
            get(get_patient).patch(update_patient).delete(delete_patient),
        )
        .route(
            "/patients/{patient_id}/medical-history",
            get(list_medical_history).post(add_medical_history),
        )
}

/* ============================================================
   Row / DTO
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: i16,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub allergies: Vec<String>,
    pub blood_type: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub emergency_relationship: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PATIENT_COLUMNS: &str = r#"
    patient_id, first_name, last_name, phone, email, birth_date, gender,
    address_street, address_city, address_state, address_zip,
    allergies, blood_type,
    emergency_name, emergency_phone, emergency_relationship,
    is_active, created_at, updated_at
"#;

/* ============================================================
   POST /patients
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<i16>, // 0 unspecified, 1 male, 2 female, 3 other
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub blood_type: Option<String>,
    pub emergency_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub emergency_relationship: Option<String>,
}

pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePatientRequest>,
) -> Result<Json<PatientRow>, ApiError> {
    ensure_staff(&auth)?;

    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    let phone = req.phone.trim();

    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "first_name and last_name are required".to_string(),
        ));
    }
    if phone.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "phone is required".to_string(),
        ));
    }
    let gender = req.gender.unwrap_or(0);
    if !(0..=3).contains(&gender) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "gender must be 0..3".to_string(),
        ));
    }

    let sql = format!(
        r#"
        INSERT INTO patient (
            first_name, last_name, phone, email, birth_date, gender,
            address_street, address_city, address_state, address_zip,
            allergies, blood_type,
            emergency_name, emergency_phone, emergency_relationship
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
        RETURNING {PATIENT_COLUMNS}
        "#
    );

    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&sql)
        .bind(first_name)
        .bind(last_name)
        .bind(phone)
        .bind(req.email.as_deref().map(str::trim))
        .bind(req.birth_date)
        .bind(gender)
        .bind(req.address_street.as_deref())
        .bind(req.address_city.as_deref())
        .bind(req.address_state.as_deref())
        .bind(req.address_zip.as_deref())
        .bind(req.allergies.unwrap_or_default())
        .bind(req.blood_type.as_deref())
        .bind(req.emergency_name.as_deref())
        .bind(req.emergency_phone.as_deref())
        .bind(req.emergency_relationship.as_deref())
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(row))
}

/* ============================================================
   GET /patients (search)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub include_inactive: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn search_patients(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<PatientRow>>, ApiError> {
    ensure_staff(&auth)?;

    let include_inactive = q.include_inactive.unwrap_or(false);
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1) * limit;

    let query = q.query.unwrap_or_default().trim().to_string();
    if query.is_empty() {
        // default: most recent
        let sql = format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patient
            WHERE (is_active = true OR $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows: Vec<PatientRow> = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(include_inactive)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
        return Ok(Json(rows));
    }

    let like = format!("%{}%", query);

    let sql = format!(
        r#"
        SELECT {PATIENT_COLUMNS}
        FROM patient
        WHERE (first_name ILIKE $1
           OR last_name ILIKE $1
           OR phone ILIKE $1
           OR email ILIKE $1)
          AND (is_active = true OR $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    );

    let rows: Vec<PatientRow> = sqlx::query_as::<_, PatientRow>(&sql)
        .bind(like)
        .bind(include_inactive)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(rows))
}

/* ============================================================
   GET /patients/{id}
   ============================================================ */

pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<PatientRow>, ApiError> {
    ensure_staff(&auth)?;

    let sql = format!(
        r#"
        SELECT {PATIENT_COLUMNS}
        FROM patient
        WHERE patient_id = $1
        "#
    );

    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&sql)
        .bind(patient_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".to_string()))?;

    Ok(Json(row))
}

/* ============================================================
   PATCH /patients/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub email: Option<Option<String>>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<i16>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub address_street: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub address_city: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub address_state: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub address_zip: Option<Option<String>>,
    pub allergies: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub blood_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub emergency_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub emergency_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub emergency_relationship: Option<Option<String>>,
}

fn apply_clearable(update: Option<Option<String>>, existing: Option<String>) -> Option<String> {
    match update {
        None => existing,                  // field not provided => keep old
        Some(None) => None,                // explicitly null => clear
        Some(Some(v)) => {
            let t = v.trim();
            if t.is_empty() { None } else { Some(t.to_string()) }
        }
    }
}

pub async fn update_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<PatientRow>, ApiError> {
    ensure_staff(&auth)?;

    // Load existing
    let sql = format!(
        r#"
        SELECT {PATIENT_COLUMNS}
        FROM patient
        WHERE patient_id = $1
        "#
    );
    let existing: PatientRow = sqlx::query_as::<_, PatientRow>(&sql)
        .bind(patient_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "patient not found".to_string()))?;

    // Apply updates with validation
    let first_name = match req.first_name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.first_name.clone(),
    };
    let last_name = match req.last_name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.last_name.clone(),
    };
    let phone = match req.phone.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.phone.clone(),
    };

    let email = apply_clearable(req.email, existing.email.clone());
    let address_street = apply_clearable(req.address_street, existing.address_street.clone());
    let address_city = apply_clearable(req.address_city, existing.address_city.clone());
    let address_state = apply_clearable(req.address_state, existing.address_state.clone());
    let address_zip = apply_clearable(req.address_zip, existing.address_zip.clone());
    let blood_type = apply_clearable(req.blood_type, existing.blood_type.clone());
    let emergency_name = apply_clearable(req.emergency_name, existing.emergency_name.clone());
    let emergency_phone = apply_clearable(req.emergency_phone, existing.emergency_phone.clone());
    let emergency_relationship = apply_clearable(
        req.emergency_relationship,
        existing.emergency_relationship.clone(),
    );

    let birth_date = req.birth_date.or(existing.birth_date);
    let gender = req.gender.unwrap_or(existing.gender);
    let allergies = req.allergies.unwrap_or(existing.allergies);

    if !(0..=3).contains(&gender) {
        return Err(ApiError::BadRequest("VALIDATION_ERROR", "gender must be 0..3".into()));
    }

    let sql = format!(
        r#"
        UPDATE patient
        SET first_name = $1,
            last_name = $2,
            phone = $3,
            email = $4,
            birth_date = $5,
            gender = $6,
            address_street = $7,
            address_city = $8,
            address_state = $9,
            address_zip = $10,
            allergies = $11,
            blood_type = $12,
            emergency_name = $13,
            emergency_phone = $14,
            emergency_relationship = $15,
            updated_at = now()
        WHERE patient_id = $16
        RETURNING {PATIENT_COLUMNS}
        "#
    );

    let updated: PatientRow = sqlx::query_as::<_, PatientRow>(&sql)
        .bind(first_name)
        .bind(last_name)
        .bind(phone)
        .bind(email)
        .bind(birth_date)
        .bind(gender)
        .bind(address_street)
        .bind(address_city)
        .bind(address_state)
        .bind(address_zip)
        .bind(allergies)
        .bind(blood_type)
        .bind(emergency_name)
        .bind(emergency_phone)
        .bind(emergency_relationship)
        .bind(patient_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(updated))
}

/* ============================================================
   DELETE /patients/{id} (deactivate)
   ============================================================ */

pub async fn delete_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<crate::models::OkResponse>, ApiError> {
    ensure_staff(&auth)?;

    // Records with upcoming active bookings stay; cancel those first.
    let upcoming: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE patient_id = $1
          AND status IN (0, 1)
          AND start_at >= now()
        "#,
    )
    .bind(patient_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if upcoming > 0 {
        return Err(ApiError::BadRequest(
            "PATIENT_HAS_APPOINTMENTS",
            format!("patient has {upcoming} upcoming appointment(s); cancel them first"),
        ));
    }

    let res = sqlx::query(
        r#"
        UPDATE patient
        SET is_active = false, updated_at = now()
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "patient not found".into()));
    }

    Ok(Json(crate::models::OkResponse {
        data: crate::models::OkData { ok: true },
    }))
}

/* ============================================================
   Medical history
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MedicalHistoryRow {
    pub history_id: Uuid,
    pub patient_id: Uuid,
    pub condition: String,
    pub diagnosed_on: Option<NaiveDate>,
    pub status: i16, // 0 active, 1 resolved, 2 chronic
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_medical_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Vec<MedicalHistoryRow>>, ApiError> {
    ensure_staff(&auth)?;

    let rows: Vec<MedicalHistoryRow> = sqlx::query_as::<_, MedicalHistoryRow>(
        r#"
        SELECT history_id, patient_id, condition, diagnosed_on, status, notes, created_at
        FROM medical_history
        WHERE patient_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct AddMedicalHistoryRequest {
    pub condition: String,
    pub diagnosed_on: Option<NaiveDate>,
    pub status: Option<i16>,
    pub notes: Option<String>,
}

pub async fn add_medical_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<AddMedicalHistoryRequest>,
) -> Result<Json<MedicalHistoryRow>, ApiError> {
    ensure_staff(&auth)?;

    let condition = req.condition.trim();
    if condition.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "condition is required".into(),
        ));
    }
    let status = req.status.unwrap_or(0);
    if !(0..=2).contains(&status) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "status must be 0 (active), 1 (resolved) or 2 (chronic)".into(),
        ));
    }

    // Patient must exist
    let exists: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT patient_id
        FROM patient
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if exists.is_none() {
        return Err(ApiError::NotFound("NOT_FOUND", "patient not found".into()));
    }

    let row: MedicalHistoryRow = sqlx::query_as::<_, MedicalHistoryRow>(
        r#"
        INSERT INTO medical_history (patient_id, condition, diagnosed_on, status, notes)
        VALUES ($1,$2,$3,$4,$5)
        RETURNING history_id, patient_id, condition, diagnosed_on, status, notes, created_at
        "#,
    )
    .bind(patient_id)
    .bind(condition)
    .bind(req.diagnosed_on)
    .bind(status)
    .bind(req.notes.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(row))
}
