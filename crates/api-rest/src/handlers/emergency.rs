//! Emergency department: registration, triage, physician assignment, disposition and orders.

use crate::error::ApiResult;
use crate::AppState;
use api_shared::dto;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use hms_core::User;

#[utoipa::path(
    post,
    path = "/emergency/patients",
    request_body = dto::RegisterEmergencyPatientReq,
    responses(
        (status = 201, description = "Emergency patient registered", body = dto::EmergencyPatientRes),
        (status = 422, description = "Neither patient_id nor temp_name given, or invalid field")
    )
)]
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<dto::RegisterEmergencyPatientReq>,
) -> ApiResult<(StatusCode, Json<dto::EmergencyPatientRes>)> {
    let patient = state.emergency.register(&req)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/emergency/board",
    responses(
        (status = 200, description = "Open emergency patients, untriaged first then by severity", body = dto::EmergencyBoardRes)
    )
)]
#[axum::debug_handler]
pub async fn board(State(state): State<AppState>) -> ApiResult<Json<dto::EmergencyBoardRes>> {
    Ok(Json(state.emergency.board()?))
}

#[utoipa::path(
    get,
    path = "/emergency/patients/{id}",
    responses(
        (status = 200, description = "Emergency patient", body = dto::EmergencyPatientRes),
        (status = 404, description = "No such emergency patient")
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::EmergencyPatientRes>> {
    Ok(Json(state.emergency.get(id)?))
}

#[utoipa::path(
    post,
    path = "/emergency/patients/{id}/triage",
    request_body = dto::TriageReq,
    responses(
        (status = 201, description = "Triage recorded", body = dto::TriageRes),
        (status = 404, description = "No such emergency patient"),
        (status = 409, description = "Patient already closed"),
        (status = 422, description = "Missing or invalid category, disposition or vitals")
    )
)]
#[axum::debug_handler]
pub async fn record_triage(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<dto::TriageReq>,
) -> ApiResult<(StatusCode, Json<dto::TriageRes>)> {
    let triage = state.emergency.record_triage(id, &req, &user)?;
    Ok((StatusCode::CREATED, Json(triage)))
}

#[utoipa::path(
    get,
    path = "/emergency/patients/{id}/triage",
    responses(
        (status = 200, description = "Triage history, newest first", body = dto::ListTriageRes),
        (status = 404, description = "No such emergency patient")
    )
)]
#[axum::debug_handler]
pub async fn list_triage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::ListTriageRes>> {
    Ok(Json(state.emergency.list_triage(id)?))
}

#[utoipa::path(
    post,
    path = "/emergency/patients/{id}/assign",
    request_body = dto::AssignPhysicianReq,
    responses(
        (status = 200, description = "Physician assigned", body = dto::EmergencyPatientRes),
        (status = 422, description = "physician_id is not an active doctor")
    )
)]
#[axum::debug_handler]
pub async fn assign_physician(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<dto::AssignPhysicianReq>,
) -> ApiResult<Json<dto::EmergencyPatientRes>> {
    Ok(Json(state.emergency.assign_physician(id, &req)?))
}

#[utoipa::path(
    post,
    path = "/emergency/patients/{id}/register",
    request_body = dto::LinkPatientReq,
    responses(
        (status = 200, description = "Unidentified patient linked to a registered patient", body = dto::EmergencyPatientRes),
        (status = 409, description = "Already linked")
    )
)]
#[axum::debug_handler]
pub async fn link_patient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<dto::LinkPatientReq>,
) -> ApiResult<Json<dto::EmergencyPatientRes>> {
    Ok(Json(state.emergency.link_patient(id, &req)?))
}

#[utoipa::path(
    post,
    path = "/emergency/patients/{id}/transfer-opd",
    request_body = dto::TransferToOpdReq,
    responses(
        (status = 201, description = "OPD appointment created from the emergency visit", body = dto::AppointmentRes),
        (status = 409, description = "Disposition is not pending OPD"),
        (status = 422, description = "Patient not yet registered")
    )
)]
#[axum::debug_handler]
pub async fn transfer_to_opd(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<dto::TransferToOpdReq>,
) -> ApiResult<(StatusCode, Json<dto::AppointmentRes>)> {
    let appointment = state.emergency.transfer_to_opd(id, &req)?;
    state.appointment_changed(&appointment);
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    post,
    path = "/emergency/patients/{id}/orders",
    request_body = dto::EmergencyOrderReq,
    responses(
        (status = 201, description = "Order placed", body = dto::EmergencyOrderRes),
        (status = 422, description = "Missing order type or description")
    )
)]
#[axum::debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<dto::EmergencyOrderReq>,
) -> ApiResult<(StatusCode, Json<dto::EmergencyOrderRes>)> {
    let order = state.emergency.create_order(id, &req, &user)?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    get,
    path = "/emergency/patients/{id}/orders",
    responses(
        (status = 200, description = "Orders for the emergency patient", body = dto::ListEmergencyOrdersRes)
    )
)]
#[axum::debug_handler]
pub async fn list_orders(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::ListEmergencyOrdersRes>> {
    Ok(Json(state.emergency.list_orders(id)?))
}

#[utoipa::path(
    put,
    path = "/emergency/orders/{id}/status",
    request_body = dto::UpdateStatusReq,
    responses(
        (status = 200, description = "Order status updated", body = dto::EmergencyOrderRes),
        (status = 409, description = "Order already completed or cancelled")
    )
)]
#[axum::debug_handler]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<dto::UpdateStatusReq>,
) -> ApiResult<Json<dto::EmergencyOrderRes>> {
    Ok(Json(state.emergency.update_order_status(id, &req)?))
}
