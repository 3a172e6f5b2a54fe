use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Seconds before expiry at which a session is treated as already expired.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Identity record owned by the hosted auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata
            .get("full_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// An issued session. Opaque to the application apart from expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    /// Fills `expires_at` from `expires_in` when the token endpoint only sent the latter.
    pub fn anchored(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now.timestamp() + secs);
        }
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - EXPIRY_MARGIN_SECS <= now.timestamp(),
            None => false,
        }
    }
}
