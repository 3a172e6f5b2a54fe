//! Pay-rent form.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::validation::{normalize_kenyan_phone, FieldError, FormErrors, Validate};
use crate::backend::Backend;
use crate::errors::AppError;
use crate::models::payment::{NewPayment, PaymentMethod, RentPayment};
use crate::models::{decode_row, Record};

const REFERENCE_PREFIX: &str = "MKZ";

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentForm {
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub period: String,
}

/// `YYYY-MM` with a real month.
pub fn is_valid_period(period: &str) -> bool {
    period.len() == 7
        && NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d").is_ok()
}

/// `MKZ-<period>-<8 hex>`, e.g. `MKZ-2026-05-9F2C41AB`.
pub fn payment_reference(period: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{REFERENCE_PREFIX}-{period}-{}", token[..8].to_ascii_uppercase())
}

impl Validate for PaymentForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.check(self.listing_id.is_some(), "listing_id", "Choose the property you are paying for");
        errors.check(self.amount > 0, "amount", "Amount must be greater than 0");
        errors.check(self.method.is_some(), "method", "Payment method is required");
        if errors.require("period", &self.period) {
            errors.check(
                is_valid_period(self.period.trim()),
                "period",
                "Period must be in the form YYYY-MM",
            );
        }

        let phone = self.phone.as_deref().unwrap_or("");
        if self.method == Some(PaymentMethod::Mpesa) {
            if errors.require("phone", phone) {
                errors.check(
                    normalize_kenyan_phone(phone).is_some(),
                    "phone",
                    "Enter a valid Safaricom or Airtel number",
                );
            }
        } else if !phone.trim().is_empty() {
            errors.check(
                normalize_kenyan_phone(phone).is_some(),
                "phone",
                "Enter a valid Kenyan phone number",
            );
        }
        errors.into_result()
    }
}

impl PaymentForm {
    pub fn into_new_payment(self, tenant_id: Uuid) -> Result<NewPayment, Vec<FieldError>> {
        self.validate()?;
        let period = self.period.trim().to_string();
        let (Some(listing_id), Some(method)) = (self.listing_id, self.method) else {
            return Err(Vec::new());
        };
        Ok(NewPayment {
            tenant_id,
            listing_id,
            amount: self.amount,
            method,
            phone: self.phone.as_deref().and_then(normalize_kenyan_phone),
            reference: payment_reference(&period),
            period,
        })
    }
}

pub async fn record_payment(
    backend: &dyn Backend,
    token: &str,
    tenant_id: Uuid,
    form: PaymentForm,
) -> Result<RentPayment, AppError> {
    let payment = form.into_new_payment(tenant_id)?;
    let rows = backend
        .insert(Some(token), RentPayment::TABLE, json!(payment))
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment insert returned no row")))?;
    let recorded: RentPayment = decode_row(row)?;
    info!(reference = %recorded.reference, %tenant_id, amount = recorded.amount, "Rent payment recorded");
    Ok(recorded)
}
