use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Started,
    InProgress,
    Completed,
    OnHold,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 5] = [
        QuoteStatus::Draft,
        QuoteStatus::Started,
        QuoteStatus::InProgress,
        QuoteStatus::Completed,
        QuoteStatus::OnHold,
    ];
}

/// A generated project estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_name: String,
    pub location: String,
    pub amount: f64,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Quote {
    const TABLE: &'static str = "quotes";
}
