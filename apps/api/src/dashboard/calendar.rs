//! Calendar events and reminders.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::backend::{Backend, Query};
use crate::errors::AppError;
use crate::forms::validation::{FieldError, FormErrors, Validate};
use crate::models::calendar::{CalendarEvent, NewCalendarEvent};
use crate::models::{decode_row, decode_rows, Record};

pub const DEFAULT_REMINDER_DAYS: i64 = 7;
pub const MAX_REMINDER_DAYS: i64 = 90;
pub const MAX_REMINDER_LEAD_MINUTES: i64 = 4 * 7 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarEventForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remind_minutes_before: Option<i64>,
}

impl CalendarEventForm {
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.require("title", &self.title);
        match self.starts_at {
            None => errors.add("starts_at", "Start time is required"),
            Some(start) => errors.check(start > now, "starts_at", "Start time must be in the future"),
        }
        if let Some(lead) = self.remind_minutes_before {
            errors.check(lead >= 0, "remind_minutes_before", "Reminder lead time cannot be negative");
            errors.check(
                lead <= MAX_REMINDER_LEAD_MINUTES,
                "remind_minutes_before",
                "Reminder lead time cannot exceed four weeks",
            );
        }
        errors.into_result()
    }
}

impl Validate for CalendarEventForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        self.validate_at(Utc::now())
    }
}

pub async fn list_events(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
) -> Result<Vec<CalendarEvent>, AppError> {
    let query = Query::table(CalendarEvent::TABLE)
        .eq("user_id", user_id)
        .order("starts_at", true);
    Ok(decode_rows(backend.select(Some(token), &query).await?))
}

pub async fn create_event(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
    form: CalendarEventForm,
) -> Result<CalendarEvent, AppError> {
    form.validate()?;
    let starts_at = form.starts_at.ok_or_else(Vec::<FieldError>::new)?;
    let event = NewCalendarEvent {
        user_id,
        title: form.title.trim().to_string(),
        description: form
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        starts_at,
        remind_minutes_before: form.remind_minutes_before,
    };

    let rows = backend
        .insert(Some(token), CalendarEvent::TABLE, json!(event))
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("event insert returned no row")))?;
    let created: CalendarEvent = decode_row(row)?;
    info!(event_id = %created.id, %user_id, "Calendar event created");
    Ok(created)
}

/// Events that have not started and whose reminder falls within `days` of
/// `now`, soonest reminder first.
pub fn upcoming_reminders(
    events: &[CalendarEvent],
    now: DateTime<Utc>,
    days: i64,
) -> Vec<CalendarEvent> {
    let horizon = now + Duration::days(days.clamp(0, MAX_REMINDER_DAYS));
    let mut due: Vec<CalendarEvent> = events
        .iter()
        .filter(|e| e.starts_at >= now && e.remind_at() <= horizon)
        .cloned()
        .collect();
    due.sort_by_key(|e| e.remind_at());
    due
}
