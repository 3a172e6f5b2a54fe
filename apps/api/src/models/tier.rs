use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::profile::Tier;
use super::Record;

/// Plan configuration row: price, quota and marketing feature list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierPlan {
    pub id: Uuid,
    pub name: Tier,
    pub price_kes: f64,
    /// `None` means unlimited quotes.
    #[serde(default)]
    pub quote_limit: Option<i64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for TierPlan {
    const TABLE: &'static str = "tiers";
}

/// Admin edit of a plan. `quote_limit: Some(None)` clears the limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierPlanPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_kes: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub quote_limit: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl TierPlanPatch {
    pub fn is_empty(&self) -> bool {
        self.price_kes.is_none() && self.quote_limit.is_none() && self.features.is_none()
    }
}

/// Distinguishes a present `null` from an absent field.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}
