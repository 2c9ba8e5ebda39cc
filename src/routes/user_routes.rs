// src/routes/user_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, ROLE_ADMIN, ROLE_DENTIST, ROLE_RECEPTIONIST, role_to_string},
};

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin can manage users".into(),
        ))
    }
}

fn validate_role(role: i16) -> Result<(), ApiError> {
    if (ROLE_ADMIN..=ROLE_RECEPTIONIST).contains(&role) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "role must be 1 (admin), 2 (dentist), 3 (assistant) or 4 (receptionist)".into(),
        ))
    }
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.trim().len() < 3 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username must be at least 3 characters".into(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/{user_id}", get(get_user).patch(patch_user))
        .route("/{user_id}/deactivate", post(deactivate_user))
        .route("/{user_id}/reactivate", post(reactivate_user))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct UserListRow {
    user_id: Uuid,
    username: String,
    display_name: String,
    role: i16,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl UserListRow {
    fn into_dto(self) -> UserDto {
        UserDto {
            user_id: self.user_id,
            username: self.username,
            display_name: self.display_name,
            role: role_to_string(self.role),
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/* ============================================================
   GET / (list)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<i16>,
    pub include_inactive: Option<bool>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListUsersQuery>,
) -> Result<Json<ApiOk<Vec<UserDto>>>, ApiError> {
    // Any staff member may list dentists (the booking form needs them);
    // everything else is admin-only.
    if q.role != Some(ROLE_DENTIST) {
        ensure_admin(&auth)?;
    }

    let include_inactive = q.include_inactive.unwrap_or(false);

    let rows: Vec<UserListRow> = sqlx::query_as::<_, UserListRow>(
        r#"
        SELECT user_id, username, display_name, role, is_active, created_at
        FROM clinic_user
        WHERE ($1::smallint IS NULL OR role = $1)
          AND (is_active = true OR $2)
        ORDER BY display_name ASC
        "#,
    )
    .bind(q.role)
    .bind(include_inactive)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(UserListRow::into_dto).collect(),
    }))
}

/* ============================================================
   POST / (create)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: i16,
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<ApiOk<UserDto>>, ApiError> {
    ensure_admin(&auth)?;

    let username = req.username.trim();
    let display_name = req.display_name.trim();
    validate_username(username)?;
    validate_password(&req.password)?;
    validate_role(req.role)?;
    if display_name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "display_name is required".into(),
        ));
    }

    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let row: UserListRow = sqlx::query_as::<_, UserListRow>(
        r#"
        INSERT INTO clinic_user (username, display_name, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING user_id, username, display_name, role, is_active, created_at
        "#,
    )
    .bind(username)
    .bind(display_name)
    .bind(&password_hash)
    .bind(req.role)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::BadRequest("USER_CREATE_FAILED", format!("{e}")))?;

    Ok(Json(ApiOk {
        data: row.into_dto(),
    }))
}

/* ============================================================
   GET /{id}
   ============================================================ */

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<UserDto>>, ApiError> {
    if auth.role != ROLE_ADMIN && auth.user_id != user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admin can view other users".into(),
        ));
    }

    let row: UserListRow = sqlx::query_as::<_, UserListRow>(
        r#"
        SELECT user_id, username, display_name, role, is_active, created_at
        FROM clinic_user
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "user not found".into()))?;

    Ok(Json(ApiOk {
        data: row.into_dto(),
    }))
}

/* ============================================================
   PATCH /{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchUserRequest {
    pub display_name: Option<String>,
    pub role: Option<i16>,
}

pub async fn patch_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<PatchUserRequest>,
) -> Result<Json<ApiOk<UserDto>>, ApiError> {
    ensure_admin(&auth)?;

    if let Some(role) = req.role {
        validate_role(role)?;
    }
    let display_name = match req.display_name.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "display_name must not be empty".into(),
            ));
        }
        other => other,
    };

    let row: UserListRow = sqlx::query_as::<_, UserListRow>(
        r#"
        UPDATE clinic_user
        SET display_name = COALESCE($2, display_name),
            role = COALESCE($3, role)
        WHERE user_id = $1
        RETURNING user_id, username, display_name, role, is_active, created_at
        "#,
    )
    .bind(user_id)
    .bind(display_name)
    .bind(req.role)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "user not found".into()))?;

    Ok(Json(ApiOk {
        data: row.into_dto(),
    }))
}

/* ============================================================
   Activation
   ============================================================ */

pub async fn deactivate_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<crate::models::OkResponse>, ApiError> {
    ensure_admin(&auth)?;

    if user_id == auth.user_id {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "you cannot deactivate your own account".into(),
        ));
    }

    let res = sqlx::query(
        r#"
        UPDATE clinic_user
        SET is_active = false
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "user not found".into()));
    }

    // Active sessions die with the account.
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(crate::models::OkResponse {
        data: crate::models::OkData { ok: true },
    }))
}

pub async fn reactivate_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<crate::models::OkResponse>, ApiError> {
    ensure_admin(&auth)?;

    let res = sqlx::query(
        r#"
        UPDATE clinic_user
        SET is_active = true
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "user not found".into()));
    }

    Ok(Json(crate::models::OkResponse {
        data: crate::models::OkData { ok: true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_role_bounds() {
        // Valid roles should pass
        assert!(validate_role(1).is_ok());
        assert!(validate_role(2).is_ok());
        assert!(validate_role(4).is_ok());

        // Invalid roles should fail
        assert!(validate_role(0).is_err());
        assert!(validate_role(-1).is_err());
        assert!(validate_role(5).is_err());
        assert!(validate_role(100).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("al").is_err()); // Too short
        assert!(validate_username("").is_err());
        assert!(validate_username("  ").is_err()); // Only whitespace
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("short").is_err()); // Too short
        assert!(validate_password("").is_err());
    }
}
