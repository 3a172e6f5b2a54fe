use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::validation::{normalize_kenyan_phone, FieldError, FormErrors, Validate};
use crate::backend::Backend;
use crate::errors::AppError;
use crate::models::application::{ApplicationStatus, NewApplication, RentalApplication};
use crate::models::{decode_row, Record};

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationForm {
    pub listing_id: Uuid,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub occupants: i32,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApplicationForm {
    /// Validation against an explicit `today`.
    pub fn validate_on(&self, today: NaiveDate) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.require("full_name", &self.full_name);
        if errors.require("phone", &self.phone) {
            errors.check(
                normalize_kenyan_phone(&self.phone).is_some(),
                "phone",
                "Enter a valid Kenyan phone number",
            );
        }
        errors.check(self.occupants >= 1, "occupants", "At least one occupant is required");
        match self.move_in_date {
            None => errors.add("move_in_date", "Move-in date is required"),
            Some(date) => errors.check(
                date >= today,
                "move_in_date",
                "Move-in date cannot be in the past",
            ),
        }
        errors.into_result()
    }

    fn into_new_application(self, applicant_id: Uuid) -> Result<NewApplication, Vec<FieldError>> {
        let phone = normalize_kenyan_phone(&self.phone).unwrap_or(self.phone);
        let move_in_date = self.move_in_date.ok_or_else(Vec::<FieldError>::new)?;
        Ok(NewApplication {
            listing_id: self.listing_id,
            applicant_id,
            full_name: self.full_name.trim().to_string(),
            phone,
            occupants: self.occupants,
            move_in_date,
            message: self
                .message
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            status: ApplicationStatus::Pending,
        })
    }
}

impl Validate for ApplicationForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        self.validate_on(Utc::now().date_naive())
    }
}

pub async fn submit_application(
    backend: &dyn Backend,
    token: &str,
    applicant_id: Uuid,
    form: ApplicationForm,
) -> Result<RentalApplication, AppError> {
    form.validate()?;
    let application = form.into_new_application(applicant_id)?;
    let rows = backend
        .insert(Some(token), RentalApplication::TABLE, json!(application))
        .await?;
    let row = rows.into_iter().next().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("application insert returned no row"))
    })?;
    let submitted: RentalApplication = decode_row(row)?;
    info!(application_id = %submitted.id, listing_id = %submitted.listing_id, "Rental application submitted");
    Ok(submitted)
}
