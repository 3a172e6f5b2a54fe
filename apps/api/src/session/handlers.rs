use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::OAuthProvider;
use crate::errors::AppError;
use crate::forms::auth::{ForgotPasswordForm, PasswordResetForm, SignInForm, SignUpForm};
use crate::models::profile::Profile;
use crate::session::{AuthSnapshot, ProfileStatus, SignInOutcome, SignUpOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OAuthQuery {
    pub next: Option<String>,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub profile: Option<Profile>,
    pub status: ProfileStatus,
}

/// POST /api/v1/auth/sign-in
pub async fn handle_sign_in(
    State(state): State<AppState>,
    Json(form): Json<SignInForm>,
) -> Result<Json<SignInOutcome>, AppError> {
    Ok(Json(state.session.sign_in(&form).await?))
}

/// POST /api/v1/auth/sign-up
pub async fn handle_sign_up(
    State(state): State<AppState>,
    Json(form): Json<SignUpForm>,
) -> Result<Json<SignUpOutcome>, AppError> {
    Ok(Json(state.session.sign_up(&form).await?))
}

/// POST /api/v1/auth/sign-out
pub async fn handle_sign_out(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.users_view.stop();
    let redirect = state.session.sign_out().await?;
    Ok(Json(json!({ "redirect": redirect })))
}

/// GET /api/v1/auth/session
pub async fn handle_session(State(state): State<AppState>) -> Json<AuthSnapshot> {
    Json(state.session.snapshot().await)
}

/// POST /api/v1/auth/password/forgot
pub async fn handle_forgot_password(
    State(state): State<AppState>,
    Json(form): Json<ForgotPasswordForm>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.session.request_password_reset(&form).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Check your email for a password reset link" })),
    ))
}

/// POST /api/v1/auth/password/reset
pub async fn handle_reset_password(
    State(state): State<AppState>,
    Json(form): Json<PasswordResetForm>,
) -> Result<Json<Value>, AppError> {
    state.session.update_password(&form).await?;
    Ok(Json(json!({ "message": "Password updated" })))
}

/// GET /api/v1/auth/oauth/:provider?next=/dashboard
pub async fn handle_oauth_url(
    State(state): State<AppState>,
    Path(provider): Path<OAuthProvider>,
    Query(params): Query<OAuthQuery>,
) -> Json<Value> {
    let url = state.session.oauth_url(provider, params.next.as_deref());
    Json(json!({ "url": url }))
}

/// GET /api/v1/auth/remembered-email
pub async fn handle_remembered_email(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "email": state.session.remembered_email().await }))
}

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, AppError> {
    state.session.require_user().await?;
    let snapshot = state.session.snapshot().await;
    Ok(Json(ProfileResponse {
        profile: snapshot.profile,
        status: snapshot.profile_status,
    }))
}

/// POST /api/v1/profile/refresh
pub async fn handle_refresh_profile(
    State(state): State<AppState>,
) -> Result<Json<AuthSnapshot>, AppError> {
    Ok(Json(state.session.refresh_profile().await?))
}
