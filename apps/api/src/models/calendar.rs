use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;

/// A scheduled reminder belonging to one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub remind_minutes_before: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Record for CalendarEvent {
    const TABLE: &'static str = "calendar_events";
}

impl CalendarEvent {
    /// When the reminder should fire; the start time itself if no lead is set
    /// or the lead is out of range.
    pub fn remind_at(&self) -> DateTime<Utc> {
        let lead = self.remind_minutes_before.unwrap_or(0).max(0);
        chrono::Duration::try_minutes(lead)
            .and_then(|lead| self.starts_at.checked_sub_signed(lead))
            .unwrap_or(self.starts_at)
    }
}


#[derive(Debug, Clone, Serialize)]
pub struct NewCalendarEvent {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub remind_minutes_before: Option<i64>,
}
