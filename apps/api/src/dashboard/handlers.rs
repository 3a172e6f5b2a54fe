use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::dashboard::calendar::{
    create_event, list_events, upcoming_reminders, CalendarEventForm, DEFAULT_REMINDER_DAYS,
};
use crate::dashboard::listings::{get_listing, my_listings, search_listings, ListingSearch};
use crate::dashboard::{my_applications, my_payments, my_quotes, QuotesOverview};
use crate::errors::AppError;
use crate::models::application::RentalApplication;
use crate::models::calendar::CalendarEvent;
use crate::models::listing::Listing;
use crate::models::payment::RentPayment;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReminderQuery {
    pub days: Option<i64>,
}

/// GET /api/v1/quotes
pub async fn handle_my_quotes(
    State(state): State<AppState>,
) -> Result<Json<QuotesOverview>, AppError> {
    let (token, user) = state.session.require_user().await?;
    Ok(Json(my_quotes(state.backend.as_ref(), &token, user.id).await?))
}

/// GET /api/v1/calendar
pub async fn handle_list_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<CalendarEvent>>, AppError> {
    let (token, user) = state.session.require_user().await?;
    Ok(Json(list_events(state.backend.as_ref(), &token, user.id).await?))
}

/// POST /api/v1/calendar
pub async fn handle_create_event(
    State(state): State<AppState>,
    Json(form): Json<CalendarEventForm>,
) -> Result<(StatusCode, Json<CalendarEvent>), AppError> {
    let (token, user) = state.session.require_user().await?;
    let event = create_event(state.backend.as_ref(), &token, user.id, form).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/v1/calendar/reminders?days=7
pub async fn handle_reminders(
    State(state): State<AppState>,
    Query(params): Query<ReminderQuery>,
) -> Result<Json<Vec<CalendarEvent>>, AppError> {
    let (token, user) = state.session.require_user().await?;
    let events = list_events(state.backend.as_ref(), &token, user.id).await?;
    let days = params.days.unwrap_or(DEFAULT_REMINDER_DAYS);
    Ok(Json(upcoming_reminders(&events, Utc::now(), days)))
}

/// GET /api/v1/listings
/// Public; the session token is sent when there is one.
pub async fn handle_search_listings(
    State(state): State<AppState>,
    Query(search): Query<ListingSearch>,
) -> Result<Json<Vec<Listing>>, AppError> {
    let token = state.session.access_token().await.ok();
    Ok(Json(
        search_listings(state.backend.as_ref(), token.as_deref(), &search).await?,
    ))
}

/// GET /api/v1/listings/:id
pub async fn handle_get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<Listing>, AppError> {
    let token = state.session.access_token().await.ok();
    Ok(Json(
        get_listing(state.backend.as_ref(), token.as_deref(), listing_id).await?,
    ))
}

/// GET /api/v1/listings/mine
pub async fn handle_my_listings(
    State(state): State<AppState>,
) -> Result<Json<Vec<Listing>>, AppError> {
    let (token, user) = state.session.require_user().await?;
    Ok(Json(my_listings(state.backend.as_ref(), &token, user.id).await?))
}

/// GET /api/v1/payments
pub async fn handle_my_payments(
    State(state): State<AppState>,
) -> Result<Json<Vec<RentPayment>>, AppError> {
    let (token, user) = state.session.require_user().await?;
    Ok(Json(my_payments(state.backend.as_ref(), &token, user.id).await?))
}

/// GET /api/v1/applications
pub async fn handle_my_applications(
    State(state): State<AppState>,
) -> Result<Json<Vec<RentalApplication>>, AppError> {
    let (token, user) = state.session.require_user().await?;
    Ok(Json(
        my_applications(state.backend.as_ref(), &token, user.id).await?,
    ))
}
