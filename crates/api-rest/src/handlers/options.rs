//! Dropdown option lookups for the front end, served from the master-data cache.

use crate::error::ApiResult;
use crate::AppState;
use api_shared::dto;
use axum::extract::State;
use axum::Json;

#[utoipa::path(
    get,
    path = "/options/departments",
    responses(
        (status = 200, description = "Active departments ordered by name", body = [dto::DepartmentOption]),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn departments(State(state): State<AppState>) -> ApiResult<Json<Vec<dto::DepartmentOption>>> {
    Ok(Json(state.master_data.departments()?))
}

#[utoipa::path(
    get,
    path = "/options/wards",
    responses(
        (status = 200, description = "Active wards ordered by name", body = [dto::WardOption]),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn wards(State(state): State<AppState>) -> ApiResult<Json<Vec<dto::WardOption>>> {
    Ok(Json(state.master_data.wards()?))
}

#[utoipa::path(
    get,
    path = "/options/lab-tests",
    responses(
        (status = 200, description = "Active lab tests ordered by name", body = [dto::LabTestOption]),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn lab_tests(State(state): State<AppState>) -> ApiResult<Json<Vec<dto::LabTestOption>>> {
    Ok(Json(state.master_data.lab_tests()?))
}

#[utoipa::path(
    get,
    path = "/options/drugs",
    responses(
        (status = 200, description = "Non-discontinued drugs with available stock", body = [dto::DrugOption]),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn drugs(State(state): State<AppState>) -> ApiResult<Json<Vec<dto::DrugOption>>> {
    Ok(Json(state.master_data.drugs()?))
}
