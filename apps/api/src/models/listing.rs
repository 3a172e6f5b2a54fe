use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Bedsitter,
    SingleRoom,
    Apartment,
    Bungalow,
    Maisonette,
    Townhouse,
    Commercial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Available,
    Let,
    Archived,
}

/// A rental property posted by a landlord.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub county: String,
    pub town: String,
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub monthly_rent: i64,
    #[serde(default)]
    pub deposit: Option<i64>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub image_paths: Vec<String>,
    #[serde(default)]
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for Listing {
    const TABLE: &'static str = "listings";
}

#[derive(Debug, Clone, Serialize)]
pub struct NewListing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub county: String,
    pub town: String,
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub monthly_rent: i64,
    pub deposit: Option<i64>,
    pub amenities: Vec<String>,
    pub status: ListingStatus,
}
