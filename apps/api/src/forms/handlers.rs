use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::forms::application::{submit_application, ApplicationForm};
use crate::forms::listing::{attach_image, create_listing, fetch_image, ListingForm};
use crate::forms::payment::{record_payment, PaymentForm};
use crate::forms::profile::{update_profile, ProfileForm};
use crate::models::application::RentalApplication;
use crate::models::listing::Listing;
use crate::models::payment::RentPayment;
use crate::session::AuthSnapshot;
use crate::state::AppState;

/// POST /api/v1/listings
pub async fn handle_create_listing(
    State(state): State<AppState>,
    Json(form): Json<ListingForm>,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let (token, user) = state.session.require_user().await?;
    let listing = create_listing(state.backend.as_ref(), &token, user.id, form).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// POST /api/v1/listings/:id/images
/// Multipart; every `image` part is uploaded in order.
pub async fn handle_upload_images(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Listing>, AppError> {
    let (token, user) = state.session.require_user().await?;
    let mut latest = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let body = field.bytes().await.map_err(|e| {
            warn!(error = %e, "Failed to read image part");
            AppError::BadRequest("Invalid file".to_string())
        })?;
        let listing = attach_image(
            state.backend.as_ref(),
            &token,
            user.id,
            listing_id,
            &content_type,
            body,
        )
        .await?;
        latest = Some(listing);
    }

    latest
        .map(Json)
        .ok_or_else(|| AppError::BadRequest("No image provided".to_string()))
}

/// GET /api/v1/listings/:id/images/:name
pub async fn handle_get_image(
    State(state): State<AppState>,
    Path((listing_id, file_name)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.session.access_token().await.ok();
    let (content_type, body) =
        fetch_image(state.backend.as_ref(), token.as_deref(), listing_id, &file_name).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// POST /api/v1/payments
pub async fn handle_record_payment(
    State(state): State<AppState>,
    Json(form): Json<PaymentForm>,
) -> Result<(StatusCode, Json<RentPayment>), AppError> {
    let (token, user) = state.session.require_user().await?;
    let payment = record_payment(state.backend.as_ref(), &token, user.id, form).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /api/v1/applications
pub async fn handle_submit_application(
    State(state): State<AppState>,
    Json(form): Json<ApplicationForm>,
) -> Result<(StatusCode, Json<RentalApplication>), AppError> {
    let (token, user) = state.session.require_user().await?;
    let application = submit_application(state.backend.as_ref(), &token, user.id, form).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// PATCH /api/v1/profile
/// Returns the refreshed snapshot so the caller sees the new profile at once.
pub async fn handle_update_profile(
    State(state): State<AppState>,
    Json(form): Json<ProfileForm>,
) -> Result<Json<AuthSnapshot>, AppError> {
    let (token, user) = state.session.require_user().await?;
    update_profile(state.backend.as_ref(), &token, user.id, &form).await?;
    Ok(Json(state.session.refresh_profile().await?))
}
