use crate::backend::BackendError;

pub const GENERIC_AUTH_FAILURE: &str = "Authentication failed";

/// Service wording → what the user is shown. Keys match exactly or as a prefix.
const AUTH_MESSAGES: &[(&str, &str)] = &[
    (
        "Invalid login credentials",
        "The email or password you entered is incorrect. Please try again.",
    ),
    (
        "Email not confirmed",
        "Please confirm your email address before signing in. Check your inbox for the verification link.",
    ),
    (
        "User already registered",
        "An account with this email already exists. Try signing in instead.",
    ),
    (
        "Password should be at least 6 characters",
        "Your password must be at least 6 characters long.",
    ),
    (
        "Unable to validate email address",
        "Please enter a valid email address.",
    ),
    (
        "Email rate limit exceeded",
        "Too many attempts. Please wait a few minutes and try again.",
    ),
    (
        "For security purposes, you can only request this",
        "Please wait a moment before requesting another email.",
    ),
    (
        "New password should be different from the old password",
        "Your new password must be different from your current password.",
    ),
    (
        "Invalid Refresh Token",
        "Your session has expired. Please sign in again.",
    ),
];

pub fn friendly_auth_message(err: &BackendError) -> String {
    err.service_message()
        .and_then(|message| {
            AUTH_MESSAGES
                .iter()
                .find(|(key, _)| message == *key || message.starts_with(key))
                .map(|(_, friendly)| friendly.to_string())
        })
        .unwrap_or_else(|| GENERIC_AUTH_FAILURE.to_string())
}
