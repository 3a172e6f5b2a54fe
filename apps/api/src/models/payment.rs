use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    Card,
    Bank,
}

/// Rent paid by a tenant against a listing for one month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RentPayment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub listing_id: Uuid,
    pub amount: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub phone: Option<String>,
    pub reference: String,
    /// `YYYY-MM`
    pub period: String,
    pub created_at: DateTime<Utc>,
}

impl Record for RentPayment {
    const TABLE: &'static str = "payments";
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
    pub tenant_id: Uuid,
    pub listing_id: Uuid,
    pub amount: i64,
    pub method: PaymentMethod,
    pub phone: Option<String>,
    pub reference: String,
    pub period: String,
}
