//! Lab orders and prescriptions nested under an appointment.
//!
//! The appointment id in the path is the encounter the records are linked to; a record reached
//! through a different appointment is reported as not found.

use crate::error::ApiResult;
use crate::AppState;
use api_shared::dto;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use hms_core::User;

#[utoipa::path(
    post,
    path = "/appointments/{id}/lab-orders",
    request_body = dto::CreateLabOrderReq,
    responses(
        (status = 201, description = "Lab order linked to the appointment's encounter", body = dto::LabOrderRes),
        (status = 404, description = "No such appointment"),
        (status = 422, description = "Unknown or inactive lab test")
    )
)]
#[axum::debug_handler]
pub async fn create_lab_order(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    Json(req): Json<dto::CreateLabOrderReq>,
) -> ApiResult<(StatusCode, Json<dto::LabOrderRes>)> {
    let order = state.lab_orders.create(appointment_id, &req, user.id)?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    get,
    path = "/appointments/{id}/lab-orders",
    responses(
        (status = 200, description = "Lab orders of the appointment", body = dto::ListLabOrdersRes),
        (status = 404, description = "No such appointment")
    )
)]
#[axum::debug_handler]
pub async fn list_lab_orders(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> ApiResult<Json<dto::ListLabOrdersRes>> {
    Ok(Json(state.lab_orders.list(appointment_id)?))
}

#[utoipa::path(
    get,
    path = "/appointments/{id}/lab-orders/{order_id}",
    responses(
        (status = 200, description = "Lab order", body = dto::LabOrderRes),
        (status = 404, description = "Order does not belong to this appointment")
    )
)]
#[axum::debug_handler]
pub async fn get_lab_order(
    State(state): State<AppState>,
    Path((appointment_id, order_id)): Path<(i64, i64)>,
) -> ApiResult<Json<dto::LabOrderRes>> {
    Ok(Json(state.lab_orders.get(appointment_id, order_id)?))
}

#[utoipa::path(
    put,
    path = "/appointments/{id}/lab-orders/{order_id}",
    request_body = dto::UpdateLabOrderReq,
    responses(
        (status = 200, description = "Lab order updated, linkage preserved", body = dto::LabOrderRes),
        (status = 404, description = "Order does not belong to this appointment"),
        (status = 422, description = "Invalid field")
    )
)]
#[axum::debug_handler]
pub async fn update_lab_order(
    State(state): State<AppState>,
    Path((appointment_id, order_id)): Path<(i64, i64)>,
    Json(req): Json<dto::UpdateLabOrderReq>,
) -> ApiResult<Json<dto::LabOrderRes>> {
    Ok(Json(state.lab_orders.update(appointment_id, order_id, &req)?))
}

#[utoipa::path(
    delete,
    path = "/appointments/{id}/lab-orders/{order_id}",
    responses(
        (status = 204, description = "Lab order deleted"),
        (status = 404, description = "Order does not belong to this appointment")
    )
)]
#[axum::debug_handler]
pub async fn delete_lab_order(
    State(state): State<AppState>,
    Path((appointment_id, order_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    state.lab_orders.delete(appointment_id, order_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/appointments/{id}/prescriptions",
    request_body = dto::CreatePrescriptionReq,
    responses(
        (status = 201, description = "Prescription linked to the appointment's encounter", body = dto::PrescriptionRes),
        (status = 403, description = "Prescriber is not a doctor"),
        (status = 404, description = "No such appointment"),
        (status = 422, description = "Unknown drug or insufficient stock")
    )
)]
#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    Json(req): Json<dto::CreatePrescriptionReq>,
) -> ApiResult<(StatusCode, Json<dto::PrescriptionRes>)> {
    let prescription = state.pharmacy.prescribe(appointment_id, &req, &user)?;
    state.invalidate_master_drugs();
    Ok((StatusCode::CREATED, Json(prescription)))
}

#[utoipa::path(
    get,
    path = "/appointments/{id}/prescriptions",
    responses(
        (status = 200, description = "Prescriptions of the appointment", body = dto::ListPrescriptionsRes),
        (status = 404, description = "No such appointment")
    )
)]
#[axum::debug_handler]
pub async fn list_prescriptions(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> ApiResult<Json<dto::ListPrescriptionsRes>> {
    Ok(Json(state.pharmacy.list(appointment_id)?))
}

#[utoipa::path(
    post,
    path = "/prescriptions/{id}/dispense",
    responses(
        (status = 200, description = "Prescription dispensed and stock issued", body = dto::PrescriptionRes),
        (status = 409, description = "Already dispensed")
    )
)]
#[axum::debug_handler]
pub async fn dispense(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::PrescriptionRes>> {
    let prescription = state.pharmacy.dispense(id)?;
    state.invalidate_master_drugs();
    Ok(Json(prescription))
}
