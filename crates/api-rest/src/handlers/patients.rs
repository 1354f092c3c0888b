//! Patient registration, admissions and department activity.

use crate::error::ApiResult;
use crate::AppState;
use api_shared::dto;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    pub search: Option<String>,
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = dto::CreatePatientReq,
    responses(
        (status = 201, description = "Patient registered", body = dto::PatientRes),
        (status = 409, description = "MRN already in use"),
        (status = 422, description = "Invalid field")
    )
)]
#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    Json(req): Json<dto::CreatePatientReq>,
) -> ApiResult<(StatusCode, Json<dto::PatientRes>)> {
    let patient = state.patients.create(&req)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/patients",
    params(("search" = Option<String>, Query, description = "Name or MRN fragment")),
    responses(
        (status = 200, description = "Matching patients", body = dto::ListPatientsRes)
    )
)]
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Json<dto::ListPatientsRes>> {
    Ok(Json(state.patients.list(query.search.as_deref())?))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    responses(
        (status = 200, description = "Patient", body = dto::PatientRes),
        (status = 404, description = "No such patient")
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::PatientRes>> {
    Ok(Json(state.patients.get(id)?))
}

#[utoipa::path(
    post,
    path = "/encounters",
    request_body = dto::AdmitPatientReq,
    responses(
        (status = 201, description = "IPD encounter opened", body = dto::EncounterRes),
        (status = 422, description = "Unknown patient or department")
    )
)]
#[axum::debug_handler]
pub async fn admit(
    State(state): State<AppState>,
    Json(req): Json<dto::AdmitPatientReq>,
) -> ApiResult<(StatusCode, Json<dto::EncounterRes>)> {
    let encounter = state.encounters.admit(&req)?;
    state.invalidate_dashboards();
    Ok((StatusCode::CREATED, Json(encounter)))
}

#[utoipa::path(
    get,
    path = "/encounters/{id}",
    responses(
        (status = 200, description = "Encounter", body = dto::EncounterRes),
        (status = 404, description = "No such encounter")
    )
)]
#[axum::debug_handler]
pub async fn get_encounter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::EncounterRes>> {
    Ok(Json(state.encounters.get(id)?))
}

#[utoipa::path(
    post,
    path = "/encounters/{id}/complete",
    responses(
        (status = 200, description = "Encounter completed and its beds released", body = dto::EncounterRes),
        (status = 404, description = "No such encounter")
    )
)]
#[axum::debug_handler]
pub async fn complete_encounter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::EncounterRes>> {
    let encounter = state.encounters.complete(id)?;
    state.invalidate_dashboards();
    Ok(Json(encounter))
}

#[utoipa::path(
    get,
    path = "/dashboard/department-stats",
    responses(
        (status = 200, description = "Active encounters and today's appointments per department", body = dto::DepartmentStatsRes)
    )
)]
#[axum::debug_handler]
pub async fn department_stats(State(state): State<AppState>) -> ApiResult<Json<dto::DepartmentStatsRes>> {
    Ok(Json(state.master_data.department_stats()?))
}
