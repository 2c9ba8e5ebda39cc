use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod dashboard_routes;
pub mod home_routes;
pub mod invoice_routes;
pub mod patient_routes;
pub mod treatment_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest("/api/v1", patient_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", treatment_routes::router())
        .nest("/api/v1", invoice_routes::router())
        .nest("/api/v1", dashboard_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
