//! Cache maintenance and runtime settings.

use crate::auth::require_admin;
use crate::error::ApiResult;
use crate::AppState;
use api_shared::dto;
use axum::extract::State;
use axum::{Extension, Json};
use hms_core::User;

#[utoipa::path(
    post,
    path = "/admin/cache/clear",
    request_body = dto::CacheClearReq,
    responses(
        (status = 200, description = "Entries removed", body = dto::CacheClearRes),
        (status = 403, description = "Admin only")
    )
)]
#[axum::debug_handler]
pub async fn cache_clear(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<dto::CacheClearReq>,
) -> ApiResult<Json<dto::CacheClearRes>> {
    require_admin(&user)?;
    let removed = state.cache.clear(req.prefix.as_deref())?;
    Ok(Json(dto::CacheClearRes { removed }))
}

#[utoipa::path(
    post,
    path = "/admin/cache/warm",
    responses(
        (status = 200, description = "Keys recomputed", body = dto::CacheWarmRes),
        (status = 403, description = "Admin only")
    )
)]
#[axum::debug_handler]
pub async fn cache_warm(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<dto::CacheWarmRes>> {
    require_admin(&user)?;
    let warmed = state.master_data.warm()?;
    Ok(Json(dto::CacheWarmRes { warmed }))
}

#[utoipa::path(
    get,
    path = "/admin/cache/stats",
    responses(
        (status = 200, description = "Entry counts and keys", body = dto::CacheStatsRes),
        (status = 403, description = "Admin only")
    )
)]
#[axum::debug_handler]
pub async fn cache_stats(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<dto::CacheStatsRes>> {
    require_admin(&user)?;
    Ok(Json(state.cache.stats()?))
}

#[utoipa::path(
    get,
    path = "/settings/triage-categories",
    responses(
        (status = 200, description = "Triage category labels, colours and targets", body = dto::TriageCategorySettingsDto)
    )
)]
#[axum::debug_handler]
pub async fn triage_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<dto::TriageCategorySettingsDto>> {
    Ok(Json(state.settings.triage_categories()?))
}

#[utoipa::path(
    put,
    path = "/settings/triage-categories",
    request_body = dto::TriageCategorySettingsDto,
    responses(
        (status = 200, description = "Settings saved in severity order", body = dto::TriageCategorySettingsDto),
        (status = 403, description = "Admin only"),
        (status = 422, description = "Missing, duplicate or malformed category")
    )
)]
#[axum::debug_handler]
pub async fn set_triage_categories(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<dto::TriageCategorySettingsDto>,
) -> ApiResult<Json<dto::TriageCategorySettingsDto>> {
    require_admin(&user)?;
    Ok(Json(state.settings.set_triage_categories(&req)?))
}
