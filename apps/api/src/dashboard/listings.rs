//! Public listing search and the owner's own listings.

use serde::Deserialize;
use uuid::Uuid;

use crate::backend::{Backend, Query};
use crate::errors::AppError;
use crate::models::listing::Listing;
use crate::models::{decode_row, decode_rows, Record};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;
pub const MAX_SEARCH_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingSearch {
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub max_rent: Option<i64>,
    #[serde(default)]
    pub min_bedrooms: Option<i32>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListingSearch {
    pub fn to_query(&self) -> Query {
        let mut query = Query::table(Listing::TABLE).eq("status", "available");
        if let Some(county) = self.county.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            query = query.eq("county", county);
        }
        if let Some(max_rent) = self.max_rent {
            query = query.lte("monthly_rent", max_rent);
        }
        if let Some(min_bedrooms) = self.min_bedrooms {
            query = query.gte("bedrooms", min_bedrooms);
        }
        let limit = self
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        query.order("created_at", false).limit(limit)
    }
}

/// Available listings only, newest first. Works without a session.
pub async fn search_listings(
    backend: &dyn Backend,
    token: Option<&str>,
    search: &ListingSearch,
) -> Result<Vec<Listing>, AppError> {
    let rows = backend.select(token, &search.to_query()).await?;
    Ok(decode_rows(rows))
}

pub async fn get_listing(
    backend: &dyn Backend,
    token: Option<&str>,
    listing_id: Uuid,
) -> Result<Listing, AppError> {
    let query = Query::table(Listing::TABLE).eq("id", listing_id).limit(1);
    let row = backend
        .select(token, &query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Listing {listing_id} not found")))?;
    Ok(decode_row(row)?)
}

pub async fn my_listings(
    backend: &dyn Backend,
    token: &str,
    owner_id: Uuid,
) -> Result<Vec<Listing>, AppError> {
    let query = Query::table(Listing::TABLE)
        .eq("owner_id", owner_id)
        .order("created_at", false);
    Ok(decode_rows(backend.select(Some(token), &query).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use serde_json::json;

    fn listing_row(county: &str, rent: i64, bedrooms: i32, status: &str, created: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "owner_id": Uuid::new_v4(),
            "title": format!("{bedrooms}BR in {county}"),
            "description": "Water and security included",
            "county": county,
            "town": "Town",
            "property_type": "apartment",
            "bedrooms": bedrooms,
            "monthly_rent": rent,
            "status": status,
            "created_at": created
        })
    }

    #[test]
    fn test_query_includes_only_given_filters() {
        let search = ListingSearch {
            county: Some("  ".into()),
            max_rent: Some(30_000),
            ..Default::default()
        };
        let query = search.to_query();
        let columns: Vec<_> = query.filters().iter().map(|f| f.column.as_str()).collect();
        assert_eq!(columns, vec!["status", "monthly_rent"]);
        assert_eq!(query.row_limit(), Some(DEFAULT_SEARCH_LIMIT));
    }

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let backend = MemoryBackend::new();
        backend.seed("listings", listing_row("Mombasa", 20_000, 1, "available", "2026-01-01T00:00:00Z"));
        backend.seed("listings", listing_row("Mombasa", 28_000, 2, "available", "2026-02-01T00:00:00Z"));
        backend.seed("listings", listing_row("Mombasa", 60_000, 3, "available", "2026-03-01T00:00:00Z"));
        backend.seed("listings", listing_row("Mombasa", 25_000, 2, "let", "2026-04-01T00:00:00Z"));
        backend.seed("listings", listing_row("Kisumu", 15_000, 2, "available", "2026-05-01T00:00:00Z"));

        let search = ListingSearch {
            county: Some("Mombasa".into()),
            max_rent: Some(30_000),
            min_bedrooms: Some(1),
            limit: None,
        };
        let found = search_listings(&backend, None, &search).await.unwrap();

        let rents: Vec<_> = found.iter().map(|l| l.monthly_rent).collect();
        assert_eq!(rents, vec![28_000, 20_000]);
    }

    #[tokio::test]
    async fn test_get_missing_listing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = get_listing(&backend, None, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
