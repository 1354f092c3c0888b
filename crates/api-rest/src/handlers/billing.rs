//! Billing accounts, discounts, payments, discharge and the revenue dashboard.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use api_shared::dto;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use hms_core::db::parse_date;
use hms_core::{DashboardFilter, User};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub branch_id: Option<i64>,
    /// Inclusive start day, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Inclusive end day, `YYYY-MM-DD`.
    pub to: Option<String>,
}

fn query_date(field: &str, value: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    value
        .map(parse_date)
        .transpose()
        .map_err(|_| ApiError::validation(field, "expected YYYY-MM-DD"))
}

#[utoipa::path(
    post,
    path = "/billing/accounts",
    request_body = dto::OpenBillingAccountReq,
    responses(
        (status = 201, description = "Account opened with its invoice number", body = dto::BillingAccountRes),
        (status = 409, description = "Encounter already has an account")
    )
)]
#[axum::debug_handler]
pub async fn open_account(
    State(state): State<AppState>,
    Json(req): Json<dto::OpenBillingAccountReq>,
) -> ApiResult<(StatusCode, Json<dto::BillingAccountRes>)> {
    let account = state.billing.open(&req)?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    get,
    path = "/billing/accounts/{id}",
    responses(
        (status = 200, description = "Billing account", body = dto::BillingAccountRes),
        (status = 404, description = "No such account")
    )
)]
#[axum::debug_handler]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::BillingAccountRes>> {
    Ok(Json(state.billing.get(id)?))
}

#[utoipa::path(
    post,
    path = "/billing/accounts/{id}/charges",
    request_body = dto::AddChargeReq,
    responses(
        (status = 200, description = "Charge added", body = dto::BillingAccountRes),
        (status = 409, description = "Account not open")
    )
)]
#[axum::debug_handler]
pub async fn add_charge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<dto::AddChargeReq>,
) -> ApiResult<Json<dto::BillingAccountRes>> {
    Ok(Json(state.billing.add_charge(id, &req)?))
}

#[utoipa::path(
    post,
    path = "/billing/accounts/{id}/discount",
    request_body = dto::ApplyDiscountReq,
    responses(
        (status = 200, description = "Discount approved", body = dto::BillingAccountRes),
        (status = 403, description = "Approver is not an admin"),
        (status = 422, description = "Discount exceeds balance")
    )
)]
#[axum::debug_handler]
pub async fn apply_discount(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<dto::ApplyDiscountReq>,
) -> ApiResult<Json<dto::BillingAccountRes>> {
    let account = state.billing.apply_discount(id, &req, &user)?;
    Ok(Json(account))
}

#[utoipa::path(
    post,
    path = "/billing/accounts/{id}/payments",
    request_body = dto::RecordPaymentReq,
    responses(
        (status = 201, description = "Payment recorded", body = dto::PaymentRes),
        (status = 422, description = "Payment exceeds balance or unknown method")
    )
)]
#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(req): Json<dto::RecordPaymentReq>,
) -> ApiResult<(StatusCode, Json<dto::PaymentRes>)> {
    let payment = state.billing.record_payment(id, &req, &user)?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[utoipa::path(
    post,
    path = "/billing/accounts/{id}/discharge",
    responses(
        (status = 200, description = "Account discharged and encounter completed", body = dto::BillingAccountRes),
        (status = 409, description = "Outstanding balance")
    )
)]
#[axum::debug_handler]
pub async fn discharge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<dto::BillingAccountRes>> {
    let account = state.billing.discharge(id)?;
    state.invalidate_dashboards();
    Ok(Json(account))
}

#[utoipa::path(
    get,
    path = "/billing/dashboard",
    params(
        ("branch_id" = Option<i64>, Query, description = "Restrict to one branch"),
        ("from" = Option<String>, Query, description = "Window start, YYYY-MM-DD"),
        ("to" = Option<String>, Query, description = "Window end, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Revenue, discount and payment-method rollups", body = dto::BillingDashboardRes),
        (status = 422, description = "Malformed or inverted window")
    )
)]
#[axum::debug_handler]
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<dto::BillingDashboardRes>> {
    let filter = DashboardFilter {
        branch_id: query.branch_id,
        from: query_date("from", query.from.as_deref())?,
        to: query_date("to", query.to.as_deref())?,
    };
    Ok(Json(state.billing.dashboard(&filter)?))
}
