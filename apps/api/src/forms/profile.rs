use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::validation::{normalize_kenyan_phone, FieldError, FormErrors, Validate};
use crate::backend::{Backend, Query};
use crate::errors::AppError;
use crate::models::profile::{Profile, ProfilePatch};
use crate::models::{decode_row, Record};

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ProfileForm {
    fn phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

impl Validate for ProfileForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.require("full_name", &self.full_name);
        if let Some(phone) = self.phone() {
            errors.check(
                normalize_kenyan_phone(phone).is_some(),
                "phone",
                "Enter a valid Kenyan phone number",
            );
        }
        errors.into_result()
    }
}

/// Updates the caller's own profile row.
pub async fn update_profile(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
    form: &ProfileForm,
) -> Result<Profile, AppError> {
    form.validate()?;

    let mut patch = ProfilePatch::new();
    patch.full_name = Some(form.full_name.trim().to_string());
    patch.phone = form.phone().and_then(normalize_kenyan_phone);

    let rows = backend
        .update(
            Some(token),
            &Query::table(Profile::TABLE).eq("id", user_id),
            json!(patch),
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    info!(%user_id, "Profile updated");
    Ok(decode_row(row)?)
}
