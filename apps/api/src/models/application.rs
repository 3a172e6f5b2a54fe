use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A prospective tenant's application for a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RentalApplication {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub applicant_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub occupants: i32,
    pub move_in_date: NaiveDate,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for RentalApplication {
    const TABLE: &'static str = "applications";
}

#[derive(Debug, Clone, Serialize)]
pub struct NewApplication {
    pub listing_id: Uuid,
    pub applicant_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub occupants: i32,
    pub move_in_date: NaiveDate,
    pub message: Option<String>,
    pub status: ApplicationStatus,
}
