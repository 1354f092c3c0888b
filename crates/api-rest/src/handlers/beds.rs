//! Bed assignment, occupancy and reconciliation.

use crate::auth::require_admin;
use crate::error::ApiResult;
use crate::AppState;
use api_shared::dto;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use hms_core::User;

#[utoipa::path(
    post,
    path = "/beds/{id}/assign",
    request_body = dto::AssignBedReq,
    responses(
        (status = 201, description = "Bed assigned to an active IPD encounter", body = dto::BedAssignmentRes),
        (status = 409, description = "Bed not available or encounter already holds a bed"),
        (status = 422, description = "Encounter is not an active IPD admission")
    )
)]
#[axum::debug_handler]
pub async fn assign(
    State(state): State<AppState>,
    Path(bed_id): Path<i64>,
    Json(req): Json<dto::AssignBedReq>,
) -> ApiResult<(StatusCode, Json<dto::BedAssignmentRes>)> {
    let assignment = state.beds.assign(bed_id, &req)?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

#[utoipa::path(
    post,
    path = "/beds/assignments/{id}/release",
    responses(
        (status = 200, description = "Assignment released", body = dto::BedAssignmentRes),
        (status = 409, description = "Already released")
    )
)]
#[axum::debug_handler]
pub async fn release(
    State(state): State<AppState>,
    Path(assignment_id): Path<i64>,
) -> ApiResult<Json<dto::BedAssignmentRes>> {
    Ok(Json(state.beds.release(assignment_id)?))
}

#[utoipa::path(
    post,
    path = "/beds/assignments/{id}/transfer",
    request_body = dto::TransferBedReq,
    responses(
        (status = 201, description = "Encounter moved to another bed", body = dto::BedAssignmentRes),
        (status = 409, description = "Target bed not available")
    )
)]
#[axum::debug_handler]
pub async fn transfer(
    State(state): State<AppState>,
    Path(assignment_id): Path<i64>,
    Json(req): Json<dto::TransferBedReq>,
) -> ApiResult<(StatusCode, Json<dto::BedAssignmentRes>)> {
    let assignment = state.beds.transfer(assignment_id, &req)?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

#[utoipa::path(
    get,
    path = "/beds/occupancy",
    responses(
        (status = 200, description = "Effective occupancy by status and ward", body = dto::BedOccupancyRes)
    )
)]
#[axum::debug_handler]
pub async fn occupancy(State(state): State<AppState>) -> ApiResult<Json<dto::BedOccupancyRes>> {
    Ok(Json(state.beds.occupancy()?))
}

#[utoipa::path(
    post,
    path = "/beds/reconcile",
    responses(
        (status = 200, description = "Stored bed status realigned with active admissions", body = dto::ReconcileRes),
        (status = 403, description = "Admin only")
    )
)]
#[axum::debug_handler]
pub async fn reconcile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<dto::ReconcileRes>> {
    require_admin(&user)?;
    Ok(Json(state.beds.reconcile()?))
}
