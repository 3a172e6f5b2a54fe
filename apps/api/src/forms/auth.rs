use serde::Deserialize;

use super::validation::{FieldError, FormErrors, Validate};

#[derive(Debug, Clone, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

impl Validate for SignInForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.email("email", &self.email);
        errors.require("password", &self.password);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Validate for SignUpForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.require("full_name", &self.full_name);
        errors.email("email", &self.email);
        errors.password_pair(&self.password, &self.confirm_password);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

impl Validate for ForgotPasswordForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.email("email", &self.email);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetForm {
    pub password: String,
    pub confirm_password: String,
}

impl Validate for PasswordResetForm {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = FormErrors::new();
        errors.password_pair(&self.password, &self.confirm_password);
        errors.into_result()
    }
}
