//! Hosted backend client: the single point of entry for auth, row storage,
//! file storage and realtime change feeds.
//!
//! No other module may build requests against the hosted backend directly.
//! Everything goes through the `Backend` trait, held in `AppState` as
//! `Arc<dyn Backend>`.

pub mod http;
#[cfg(test)]
pub mod memory;
pub mod query;
pub mod realtime;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{AuthUser, Session};

pub use query::{Filter, Query};
pub use realtime::{ChangeEvent, ChangeKind, ChangeStream};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Privileged operation requires the service-role key")]
    PrivilegedUnavailable,
}

impl BackendError {
    /// The message as the service phrased it, used for user-facing mapping.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            BackendError::Api { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Api { status, .. } => Some(*status),
            BackendError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result of a sign-up. `session` is absent while email confirmation is pending.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub user: AuthUser,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Facebook => "facebook",
        }
    }
}

/// Everything the application asks of the hosted backend.
///
/// `token` parameters carry the signed-in user's access token; `None` sends
/// the request with the public key only, subject to the store's row policies.
#[async_trait]
pub trait Backend: Send + Sync {
    // ── auth ──────────────────────────────────────────────────────────────
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, BackendError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUp, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    /// The auth client's own view of the current session, refreshed once if expired.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    /// Hands a session restored from local storage to the auth client.
    async fn set_session(&self, session: Option<Session>);

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;

    async fn send_password_reset(&self, email: &str, redirect_to: &str)
        -> Result<(), BackendError>;

    async fn update_password(&self, access_token: &str, password: &str)
        -> Result<(), BackendError>;

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String;

    // ── rows ──────────────────────────────────────────────────────────────
    async fn select(&self, token: Option<&str>, query: &Query) -> Result<Vec<Value>, BackendError>;

    async fn insert(
        &self,
        token: Option<&str>,
        table: &str,
        row: Value,
    ) -> Result<Vec<Value>, BackendError>;

    async fn update(
        &self,
        token: Option<&str>,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, token: Option<&str>, query: &Query) -> Result<(), BackendError>;

    // ── storage ───────────────────────────────────────────────────────────
    async fn upload(
        &self,
        token: Option<&str>,
        bucket: &str,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, BackendError>;

    async fn download(
        &self,
        token: Option<&str>,
        bucket: &str,
        path: &str,
    ) -> Result<Bytes, BackendError>;

    // ── realtime ──────────────────────────────────────────────────────────
    async fn subscribe(
        &self,
        token: Option<&str>,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<ChangeStream, BackendError>;

    // ── privileged (service-role key only) ───────────────────────────────
    async fn admin_get_user(&self, user_id: Uuid) -> Result<AuthUser, BackendError>;

    async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), BackendError>;
}
