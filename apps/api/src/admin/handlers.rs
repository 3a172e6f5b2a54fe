use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::admin::aggregation::{compute_dashboard, DashboardStats};
use crate::admin::service::{self, VerificationStatus};
use crate::errors::AppError;
use crate::models::profile::{Profile, Tier};
use crate::models::quote::Quote;
use crate::models::tier::{TierPlan, TierPlanPatch};
use crate::state::AppState;
use crate::timeout::with_timeout;

/// Deadline for the three whole-table downloads.
const TABLE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct TierRequest {
    pub tier: Tier,
}

#[derive(Deserialize)]
pub struct AdminFlagRequest {
    pub is_admin: bool,
}

/// GET /api/v1/admin/dashboard
pub async fn handle_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    let (token, _) = state.session.require_admin().await?;
    let tables = with_timeout(
        TABLE_LOAD_TIMEOUT,
        service::load_tables(state.backend.as_ref(), &token),
    )
    .await
    .into_result(AppError::Timeout)?;
    Ok(Json(compute_dashboard(
        &tables.profiles,
        &tables.quotes,
        &tables.tiers,
        Utc::now(),
    )))
}

/// GET /api/v1/admin/users
/// Served from the live view; the first call starts the subscription.
pub async fn handle_list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<Profile>>, AppError> {
    let (token, _) = state.session.require_admin().await?;
    let profiles = state
        .users_view
        .ensure_live(state.backend.clone(), token)
        .await?;
    Ok(Json(profiles))
}

/// PATCH /api/v1/admin/users/:id/tier
pub async fn handle_set_tier(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<TierRequest>,
) -> Result<Json<Profile>, AppError> {
    let (token, acting) = state.session.require_admin().await?;
    let profile =
        service::set_user_tier(state.backend.as_ref(), &token, &acting, user_id, req.tier).await?;
    Ok(Json(profile))
}

/// PATCH /api/v1/admin/users/:id/admin
pub async fn handle_set_admin(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AdminFlagRequest>,
) -> Result<Json<Profile>, AppError> {
    let (token, acting) = state.session.require_admin().await?;
    let profile =
        service::set_admin(state.backend.as_ref(), &token, &acting, user_id, req.is_admin).await?;
    Ok(Json(profile))
}

/// DELETE /api/v1/admin/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let (token, acting) = state.session.require_admin().await?;
    service::delete_account(state.backend.as_ref(), &token, &acting, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/users/:id/verification
pub async fn handle_verification(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<VerificationStatus>, AppError> {
    let (_, acting) = state.session.require_admin().await?;
    let status = service::verification_status(state.backend.as_ref(), &acting, user_id).await?;
    Ok(Json(status))
}

/// GET /api/v1/admin/quotes
pub async fn handle_list_quotes(
    State(state): State<AppState>,
) -> Result<Json<Vec<Quote>>, AppError> {
    let (token, _) = state.session.require_admin().await?;
    Ok(Json(service::list_quotes(state.backend.as_ref(), &token).await?))
}

/// GET /api/v1/admin/tiers
pub async fn handle_list_tiers(
    State(state): State<AppState>,
) -> Result<Json<Vec<TierPlan>>, AppError> {
    let (token, _) = state.session.require_admin().await?;
    Ok(Json(
        service::list_tier_plans(state.backend.as_ref(), &token).await?,
    ))
}

/// PATCH /api/v1/admin/tiers/:id
pub async fn handle_update_tier(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Json(patch): Json<TierPlanPatch>,
) -> Result<Json<TierPlan>, AppError> {
    let (token, acting) = state.session.require_admin().await?;
    let plan =
        service::update_tier_plan(state.backend.as_ref(), &token, &acting, plan_id, &patch).await?;
    Ok(Json(plan))
}
