//! Appointment booking, status changes and the live status feed.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use api_shared::dto;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream};
use hms_core::db::parse_date;
use hms_core::AppointmentFilter;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    pub physician_id: Option<i64>,
    pub patient_id: Option<i64>,
}

impl AppointmentQuery {
    fn into_filter(self) -> ApiResult<AppointmentFilter> {
        let date = self
            .date
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(|_| ApiError::validation("date", "expected YYYY-MM-DD"))?;
        Ok(AppointmentFilter {
            date,
            physician_id: self.physician_id,
            patient_id: self.patient_id,
        })
    }
}

#[utoipa::path(
    post,
    path = "/appointments",
    request_body = dto::CreateAppointmentReq,
    responses(
        (status = 201, description = "Appointment booked with its OPD encounter", body = dto::AppointmentRes),
        (status = 422, description = "Unknown patient, physician or department")
    )
)]
#[axum::debug_handler]
pub async fn book(
    State(state): State<AppState>,
    Json(req): Json<dto::CreateAppointmentReq>,
) -> ApiResult<(StatusCode, Json<dto::AppointmentRes>)> {
    let appointment = state.appointments.book(&req)?;
    state.appointment_changed(&appointment);
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    get,
    path = "/appointments",
    params(
        ("date" = Option<String>, Query, description = "Scheduled day, YYYY-MM-DD"),
        ("physician_id" = Option<i64>, Query, description = "Physician filter"),
        ("patient_id" = Option<i64>, Query, description = "Patient filter")
    ),
    responses(
        (status = 200, description = "Appointments ordered by scheduled time", body = dto::ListAppointmentsRes),
        (status = 422, description = "Malformed date")
    )
)]
#[axum::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AppointmentQuery>,
) -> ApiResult<Json<dto::ListAppointmentsRes>> {
    let filter = query.into_filter()?;
    Ok(Json(state.appointments.list(&filter)?))
}

#[utoipa::path(
    get,
    path = "/appointments/{id}",
    responses(
        (status = 200, description = "Appointment", body = dto::AppointmentRes),
        (status = 404, description = "No such appointment")
    )
)]
#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::AppointmentRes>> {
    Ok(Json(state.appointments.get(id)?))
}

#[utoipa::path(
    put,
    path = "/appointments/{id}/status",
    request_body = dto::UpdateStatusReq,
    responses(
        (status = 200, description = "Status changed and broadcast", body = dto::AppointmentRes),
        (status = 409, description = "Transition not allowed"),
        (status = 422, description = "Unknown status")
    )
)]
#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<dto::UpdateStatusReq>,
) -> ApiResult<Json<dto::AppointmentRes>> {
    let appointment = state.appointments.update_status(id, &req)?;
    state.appointment_changed(&appointment);
    Ok(Json(appointment))
}

#[utoipa::path(
    get,
    path = "/appointments/events",
    responses(
        (status = 200, description = "Server-sent `appointment` events carrying AppointmentRes JSON")
    )
)]
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.appointment_events.subscribe();
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(appointment) => match Event::default().event("appointment").json_data(&appointment) {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(e) => tracing::warn!(error = %e, "failed to encode appointment event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "appointment event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
