use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::Record;

/// Subscription plan bounding feature access and quote quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    #[serde(alias = "free", alias = "FREE")]
    Free,
    #[serde(alias = "intermediate", alias = "INTERMEDIATE")]
    Intermediate,
    #[serde(alias = "professional", alias = "PROFESSIONAL")]
    Professional,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Intermediate, Tier::Professional];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Intermediate => "Intermediate",
            Tier::Professional => "Professional",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level user record, one per auth user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub quotes_used: i64,
    /// `None` means unlimited.
    #[serde(default)]
    pub quote_limit: Option<i64>,
    #[serde(default, deserialize_with = "admin_flag")]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Profile {
    const TABLE: &'static str = "profiles";
}

impl Profile {
    pub fn is_over_quota(&self) -> bool {
        self.quote_limit
            .map(|limit| self.quotes_used >= limit)
            .unwrap_or(false)
    }
}

/// The admin flag has been stored both as a boolean and as a role string.
fn admin_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_i64() == Some(1)),
        Value::String(s) => Ok(matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "admin" | "1" | "yes"
        )),
        other => Err(de::Error::custom(format!(
            "expected boolean or role string for is_admin, got {other}"
        ))),
    }
}

/// Row inserted the first time a user signs in.
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub tier: Tier,
    pub quotes_used: i64,
    pub is_admin: bool,
}

impl NewProfile {
    pub fn free(id: Uuid, email: String, full_name: Option<String>) -> Self {
        Self {
            id,
            email,
            full_name,
            tier: Tier::Free,
            quotes_used: 0,
            is_admin: false,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl ProfilePatch {
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            ..Default::default()
        }
    }
}
