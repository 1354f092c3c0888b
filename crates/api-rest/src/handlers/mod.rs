pub mod admin;
pub mod appointments;
pub mod beds;
pub mod billing;
pub mod emergency;
pub mod options;
pub mod orders;
pub mod patients;

use api_shared::{dto, HealthService};
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = dto::HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Unauthenticated; used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub async fn health() -> Json<dto::HealthRes> {
    Json(HealthService::check_health())
}
