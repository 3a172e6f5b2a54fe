use serde::{Deserialize, Serialize};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Shallow, pre-submission validation of a form. Runs before any network call.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

/// Accumulates field errors for a whole form so they can be shown together.
#[derive(Debug, Default)]
pub struct FormErrors {
    errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Records "<Field> is required" for blank input; returns whether it was present.
    pub fn require(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.add(field, format!("{} is required", label(field)));
            return false;
        }
        true
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if self.require(field, value) && !looks_like_email(value.trim()) {
            self.add(field, "Enter a valid email address");
        }
    }

    /// Length first, then confirmation match, reported on their own fields.
    pub fn password_pair(&mut self, password: &str, confirm: &str) {
        if password.chars().count() < MIN_PASSWORD_LEN {
            self.add("password", PASSWORD_TOO_SHORT);
        }
        if password != confirm {
            self.add("confirm_password", PASSWORDS_DO_NOT_MATCH);
        }
    }

    pub fn into_result(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// `monthly_rent` → `Monthly rent`
fn label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !value.chars().any(char::is_whitespace)
}

/// Normalizes a Kenyan mobile number to `2547XXXXXXXX` / `2541XXXXXXXX`.
///
/// Accepts `07..`, `01..`, `+254..`, `254..` and bare 9-digit forms, with
/// spaces or dashes anywhere.
pub fn normalize_kenyan_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let subscriber = match digits.len() {
        12 if digits.starts_with("254") => &digits[3..],
        10 if digits.starts_with('0') => &digits[1..],
        9 => digits,
        _ => return None,
    };

    if subscriber.starts_with('7') || subscriber.starts_with('1') {
        Some(format!("254{subscriber}"))
    } else {
        None
    }
}
