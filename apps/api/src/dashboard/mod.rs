//! The signed-in user's dashboard: their quotes, listings, payments,
//! applications and calendar, plus the public listing search.

pub mod calendar;
pub mod handlers;
pub mod listings;

use serde::Serialize;
use uuid::Uuid;

use crate::admin::aggregation::{summarize_quotes, QuoteSummary};
use crate::backend::{Backend, Query};
use crate::errors::AppError;
use crate::models::application::RentalApplication;
use crate::models::payment::RentPayment;
use crate::models::quote::Quote;
use crate::models::{decode_rows, Record};

#[derive(Debug, Clone, Serialize)]
pub struct QuotesOverview {
    pub quotes: Vec<Quote>,
    pub summary: QuoteSummary,
}

/// Newest-first rows of `T` whose `owner_column` is the user.
async fn owned_rows<T: Record>(
    backend: &dyn Backend,
    token: &str,
    owner_column: &str,
    user_id: Uuid,
) -> Result<Vec<T>, AppError> {
    let query = Query::table(T::TABLE)
        .eq(owner_column, user_id)
        .order("created_at", false);
    let rows = backend.select(Some(token), &query).await?;
    Ok(decode_rows(rows))
}

pub async fn my_quotes(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
) -> Result<QuotesOverview, AppError> {
    let quotes: Vec<Quote> = owned_rows(backend, token, "user_id", user_id).await?;
    let summary = summarize_quotes(&quotes);
    Ok(QuotesOverview { quotes, summary })
}

pub async fn my_payments(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
) -> Result<Vec<RentPayment>, AppError> {
    owned_rows(backend, token, "tenant_id", user_id).await
}

pub async fn my_applications(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
) -> Result<Vec<RentalApplication>, AppError> {
    owned_rows(backend, token, "applicant_id", user_id).await
}
