//! Session and identity container.
//!
//! Built once at the composition root and shared through `AppState`. Owns the
//! current session, the signed-in user's profile and the realtime feed that
//! keeps that profile fresh. All auth commands go through here.

pub mod handlers;
pub mod messages;
pub mod redirect;
pub mod store;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError, Filter, OAuthProvider, Query};
use crate::errors::AppError;
use crate::forms::auth::{ForgotPasswordForm, PasswordResetForm, SignInForm, SignUpForm};
use crate::forms::validation::Validate;
use crate::models::auth::{AuthUser, Session};
use crate::models::profile::{NewProfile, Profile};
use crate::models::{decode_row, Record, RowError};
use crate::timeout::{with_timeout, Outcome};

use messages::friendly_auth_message;
use redirect::{role_destination, safe_redirect, DASHBOARD, HOME};
use store::{LocalStore, REMEMBER_EMAIL_KEY, SESSION_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Session restore has not finished yet.
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Idle,
    Loaded,
    TimedOut,
    Failed,
}

/// Read-only view of the container handed to handlers and the route guard.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub phase: Phase,
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub profile_status: ProfileStatus,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().map(|p| p.is_admin).unwrap_or(false)
    }

    pub fn destination(&self) -> &'static str {
        role_destination(self.profile.as_ref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInOutcome {
    pub destination: String,
    pub snapshot: AuthSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignUpOutcome {
    SignedIn { destination: String },
    ConfirmEmail { email: String },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub profile_timeout: Duration,
    pub site_url: String,
}

#[derive(Debug, Error)]
enum ProfileError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Row(#[from] RowError),
    #[error("profile insert returned no row")]
    NotCreated,
}

struct State {
    phase: Phase,
    session: Option<Session>,
    profile: Option<Profile>,
    profile_status: ProfileStatus,
    /// Advances on every sign-in/sign-out so late profile results for a
    /// previous session are discarded.
    epoch: u64,
}

struct Inner {
    backend: Arc<dyn Backend>,
    store: LocalStore,
    settings: SessionSettings,
    state: RwLock<State>,
    feed: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut feed) = self.feed.lock() {
            if let Some(task) = feed.take() {
                task.abort();
            }
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn Backend>, store: LocalStore, settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                settings,
                state: RwLock::new(State {
                    phase: Phase::Loading,
                    session: None,
                    profile: None,
                    profile_status: ProfileStatus::Idle,
                    epoch: 0,
                }),
                feed: Mutex::new(None),
            }),
        }
    }

    pub async fn snapshot(&self) -> AuthSnapshot {
        let state = self.inner.state.read().await;
        AuthSnapshot {
            phase: state.phase,
            user: state.session.as_ref().map(|s| s.user.clone()),
            profile: state.profile.clone(),
            profile_status: state.profile_status,
        }
    }

    /// The signed-in user's access token, or `Unauthorized`.
    pub async fn access_token(&self) -> Result<String, AppError> {
        self.inner
            .state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(AppError::Unauthorized)
    }

    /// Token and user for a signed-in caller.
    pub async fn require_user(&self) -> Result<(String, AuthUser), AppError> {
        let state = self.inner.state.read().await;
        let session = state.session.as_ref().ok_or(AppError::Unauthorized)?;
        Ok((session.access_token.clone(), session.user.clone()))
    }

    /// Token and profile for a signed-in admin; `Forbidden` for everyone else.
    pub async fn require_admin(&self) -> Result<(String, Profile), AppError> {
        let state = self.inner.state.read().await;
        let session = state.session.as_ref().ok_or(AppError::Unauthorized)?;
        match &state.profile {
            Some(profile) if profile.is_admin => {
                Ok((session.access_token.clone(), profile.clone()))
            }
            _ => {
                warn!(user_id = %session.user.id, "Admin access denied");
                Err(AppError::Forbidden)
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Restore
    // ────────────────────────────────────────────────────────────────────

    /// Restores a persisted (or auth-client-held) session and loads its
    /// profile. Always ends in `Phase::Ready`.
    pub async fn restore(&self) {
        let restored = self.restore_session().await;

        match restored {
            Some(session) => {
                info!(user_id = %session.user.id, "Session restored");
                let epoch = self.begin(session.clone()).await;
                self.load_profile(epoch, &session).await;
                self.start_profile_feed(epoch, &session).await;
            }
            None => {
                debug!("No session to restore");
                self.inner.state.write().await.phase = Phase::Ready;
            }
        }
    }

    async fn restore_session(&self) -> Option<Session> {
        let backend = &self.inner.backend;
        let store = &self.inner.store;

        let persisted = store.get::<Session>(SESSION_KEY).await;
        if persisted.is_none() && store.contains(SESSION_KEY).await {
            warn!("Persisted session is unreadable, discarding it");
            if let Err(e) = store.remove(SESSION_KEY).await {
                warn!(error = %e, "Failed to clear stale session");
            }
        }

        match persisted {
            Some(session) if !session.is_expired(Utc::now()) => {
                backend.set_session(Some(session.clone())).await;
                Some(session)
            }
            Some(expired) => match backend.refresh_session(&expired.refresh_token).await {
                Ok(fresh) => {
                    self.persist_session(&fresh).await;
                    Some(fresh)
                }
                Err(e) => {
                    warn!(error = %e, "Persisted session expired and could not be refreshed");
                    if let Err(e) = store.remove(SESSION_KEY).await {
                        warn!(error = %e, "Failed to clear stale session");
                    }
                    None
                }
            },
            None => match backend.current_session().await {
                Ok(Some(session)) => {
                    self.persist_session(&session).await;
                    Some(session)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "Remote session lookup failed");
                    None
                }
            },
        }
    }

    async fn persist_session(&self, session: &Session) {
        if let Err(e) = self.inner.store.set(SESSION_KEY, session).await {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Installs a new session, clearing the previous user's profile. The
    /// phase stays `Loading` until `load_profile` settles for this epoch.
    async fn begin(&self, session: Session) -> u64 {
        let mut state = self.inner.state.write().await;
        state.epoch += 1;
        state.session = Some(session);
        state.profile = None;
        state.profile_status = ProfileStatus::Idle;
        state.phase = Phase::Loading;
        state.epoch
    }

    // ────────────────────────────────────────────────────────────────────
    // Profile
    // ────────────────────────────────────────────────────────────────────

    /// Fetches (or, on first sign-in, creates) the profile row under the
    /// configured deadline. Timeouts and errors leave the profile empty.
    async fn load_profile(&self, epoch: u64, session: &Session) -> ProfileStatus {
        let limit = self.inner.settings.profile_timeout;
        let outcome = with_timeout(limit, self.fetch_or_create_profile(session)).await;

        let (profile, status) = match outcome {
            Outcome::Ok(profile) => (Some(profile), ProfileStatus::Loaded),
            Outcome::Timeout(limit) => {
                warn!(
                    user_id = %session.user.id,
                    timeout_secs = limit.as_secs(),
                    "Profile fetch timed out, continuing without a profile"
                );
                (None, ProfileStatus::TimedOut)
            }
            Outcome::Error(e) => {
                error!(user_id = %session.user.id, error = %e, "Profile fetch failed");
                (None, ProfileStatus::Failed)
            }
        };

        let mut state = self.inner.state.write().await;
        if state.epoch != epoch {
            debug!("Discarding profile result for a superseded session");
            return status;
        }
        state.profile = profile;
        state.profile_status = status;
        state.phase = Phase::Ready;
        status
    }

    async fn fetch_or_create_profile(&self, session: &Session) -> Result<Profile, ProfileError> {
        let backend = &self.inner.backend;
        let token = Some(session.access_token.as_str());
        let user = &session.user;

        let query = Query::table(Profile::TABLE).eq("id", user.id).limit(1);
        let rows = backend.select(token, &query).await?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(decode_row(row)?);
        }

        info!(user_id = %user.id, "No profile yet, creating a Free tier profile");
        let new_profile = NewProfile::free(
            user.id,
            user.email.clone().unwrap_or_default(),
            user.full_name().map(str::to_string),
        );
        let created = backend
            .insert(token, Profile::TABLE, json!(new_profile))
            .await?;
        let row = created.into_iter().next().ok_or(ProfileError::NotCreated)?;
        Ok(decode_row(row)?)
    }

    /// Re-runs the profile fetch for the current session.
    pub async fn refresh_profile(&self) -> Result<AuthSnapshot, AppError> {
        let (epoch, session) = {
            let state = self.inner.state.read().await;
            let session = state.session.clone().ok_or(AppError::Unauthorized)?;
            (state.epoch, session)
        };
        self.load_profile(epoch, &session).await;
        Ok(self.snapshot().await)
    }

    /// Subscribes to changes on the user's own profile row; every event
    /// triggers a full re-fetch.
    async fn start_profile_feed(&self, epoch: u64, session: &Session) {
        let stream = match self
            .inner
            .backend
            .subscribe(
                Some(&session.access_token),
                Profile::TABLE,
                Some(Filter::eq("id", session.user.id)),
            )
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Profile realtime feed unavailable");
                return;
            }
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                let Some(inner) = weak.upgrade() else { break };
                let manager = SessionManager { inner };
                debug!(kind = ?event.kind, "Own profile changed, re-fetching");
                manager.refetch_profile_for(epoch).await;
            }
        });

        self.replace_feed(Some(task));
    }

    async fn refetch_profile_for(&self, epoch: u64) {
        let session = {
            let state = self.inner.state.read().await;
            if state.epoch != epoch {
                return;
            }
            state.session.clone()
        };
        if let Some(session) = session {
            self.load_profile(epoch, &session).await;
        }
    }

    fn replace_feed(&self, task: Option<JoinHandle<()>>) {
        let previous = match self.inner.feed.lock() {
            Ok(mut feed) => std::mem::replace(&mut *feed, task),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), task),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Commands
    // ────────────────────────────────────────────────────────────────────

    pub async fn sign_in(&self, form: &SignInForm) -> Result<SignInOutcome, AppError> {
        form.validate()?;
        let email = form.email.trim();

        let session = self
            .inner
            .backend
            .sign_in_with_password(email, &form.password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Password sign-in failed");
                AppError::Auth(friendly_auth_message(&e))
            })?;

        let store = &self.inner.store;
        store.set(SESSION_KEY, &session).await?;
        if form.remember_me {
            store.set(REMEMBER_EMAIL_KEY, &email).await?;
        } else {
            store.remove(REMEMBER_EMAIL_KEY).await?;
        }

        info!(user_id = %session.user.id, "User signed in");
        let epoch = self.begin(session.clone()).await;
        self.load_profile(epoch, &session).await;
        self.start_profile_feed(epoch, &session).await;

        let snapshot = self.snapshot().await;
        Ok(SignInOutcome {
            destination: snapshot.destination().to_string(),
            snapshot,
        })
    }

    pub async fn sign_up(&self, form: &SignUpForm) -> Result<SignUpOutcome, AppError> {
        form.validate()?;
        let email = form.email.trim();

        let signed_up = self
            .inner
            .backend
            .sign_up(
                email,
                &form.password,
                json!({ "full_name": form.full_name.trim() }),
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Sign-up failed");
                AppError::Auth(friendly_auth_message(&e))
            })?;

        let Some(session) = signed_up.session else {
            info!(user_id = %signed_up.user.id, "Sign-up pending email confirmation");
            return Ok(SignUpOutcome::ConfirmEmail {
                email: email.to_string(),
            });
        };

        self.inner.store.set(SESSION_KEY, &session).await?;
        let epoch = self.begin(session.clone()).await;
        self.load_profile(epoch, &session).await;
        self.start_profile_feed(epoch, &session).await;

        Ok(SignUpOutcome::SignedIn {
            destination: self.snapshot().await.destination().to_string(),
        })
    }

    /// Clears local state and both persisted keys. The remote sign-out is
    /// best-effort. Returns the home path.
    pub async fn sign_out(&self) -> Result<&'static str, AppError> {
        let previous = {
            let mut state = self.inner.state.write().await;
            state.epoch += 1;
            state.profile = None;
            state.profile_status = ProfileStatus::Idle;
            state.phase = Phase::Ready;
            state.session.take()
        };
        self.replace_feed(None);

        if let Some(session) = previous {
            if let Err(e) = self.inner.backend.sign_out(&session.access_token).await {
                warn!(error = %e, "Remote sign-out failed; local session cleared anyway");
            }
            info!(user_id = %session.user.id, "User signed out");
        }

        let store = &self.inner.store;
        store.remove(SESSION_KEY).await?;
        store.remove(REMEMBER_EMAIL_KEY).await?;
        Ok(HOME)
    }

    pub async fn request_password_reset(&self, form: &ForgotPasswordForm) -> Result<(), AppError> {
        form.validate()?;
        let redirect_to = format!("{}/reset-password", self.inner.settings.site_url);
        self.inner
            .backend
            .send_password_reset(form.email.trim(), &redirect_to)
            .await
            .map_err(|e| {
                warn!(error = %e, "Password reset request failed");
                AppError::Auth(friendly_auth_message(&e))
            })
    }

    /// Validates locally before touching the network.
    pub async fn update_password(&self, form: &PasswordResetForm) -> Result<(), AppError> {
        form.validate()?;
        let token = self.access_token().await?;
        self.inner
            .backend
            .update_password(&token, &form.password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Password update failed");
                AppError::Auth(friendly_auth_message(&e))
            })?;
        info!("Password updated");
        Ok(())
    }

    pub fn oauth_url(&self, provider: OAuthProvider, next: Option<&str>) -> String {
        let path = safe_redirect(next).unwrap_or(DASHBOARD);
        let redirect_to = format!("{}{}", self.inner.settings.site_url, path);
        self.inner.backend.oauth_authorize_url(provider, &redirect_to)
    }

    pub async fn remembered_email(&self) -> Option<String> {
        self.inner.store.get(REMEMBER_EMAIL_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::models::profile::Tier;

    const PASSWORD: &str = "nyumba123";

    struct Harness {
        backend: Arc<MemoryBackend>,
        manager: SessionManager,
        store: LocalStore,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("store.json")).await.unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let manager = SessionManager::new(
            backend.clone(),
            store.clone(),
            SessionSettings {
                profile_timeout: Duration::from_secs(8),
                site_url: "http://localhost:5173".to_string(),
            },
        );
        Harness {
            backend,
            manager,
            store,
            _dir: dir,
        }
    }

    fn profile_row(id: uuid::Uuid, email: &str, is_admin: serde_json::Value) -> serde_json::Value {
        json!({
            "id": id,
            "email": email,
            "full_name": "Test User",
            "tier": "Free",
            "quotes_used": 0,
            "is_admin": is_admin,
            "created_at": "2026-01-01T00:00:00Z"
        })
    }

    fn sign_in_form(email: &str, remember_me: bool) -> SignInForm {
        SignInForm {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            remember_me,
        }
    }

    #[tokio::test]
    async fn test_restore_without_session_and_failed_lookup_is_unauthenticated() {
        let h = harness().await;
        h.backend.fail_session_lookup();

        assert_eq!(h.manager.snapshot().await.phase, Phase::Loading);
        h.manager.restore().await;

        let snapshot = h.manager.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Ready);
        assert!(!snapshot.is_authenticated());
    }

    #[tokio::test]
    async fn test_admin_sign_in_lands_on_admin_dashboard() {
        let h = harness().await;
        let id = h.backend.with_user("admin@makazi.co.ke", PASSWORD, "Admin");
        h.backend.seed("profiles", profile_row(id, "admin@makazi.co.ke", json!(true)));

        let outcome = h.manager.sign_in(&sign_in_form("admin@makazi.co.ke", false)).await.unwrap();
        assert_eq!(outcome.destination, "/admin");
        assert!(outcome.snapshot.is_admin());
    }

    #[tokio::test]
    async fn test_non_admin_and_absent_flag_land_on_dashboard() {
        let h = harness().await;
        let tenant = h.backend.with_user("tenant@example.co.ke", PASSWORD, "Tenant");
        h.backend.seed("profiles", profile_row(tenant, "tenant@example.co.ke", json!(false)));
        let outcome = h.manager.sign_in(&sign_in_form("tenant@example.co.ke", false)).await.unwrap();
        assert_eq!(outcome.destination, "/dashboard");

        h.manager.sign_out().await.unwrap();

        let other = h.backend.with_user("other@example.co.ke", PASSWORD, "Other");
        let mut row = profile_row(other, "other@example.co.ke", json!(null));
        row.as_object_mut().unwrap().remove("is_admin");
        h.backend.seed("profiles", row);
        let outcome = h.manager.sign_in(&sign_in_form("other@example.co.ke", false)).await.unwrap();
        assert_eq!(outcome.destination, "/dashboard");
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_fetch_timeout_ends_loading_without_profile() {
        let h = harness().await;
        let id = h.backend.with_user("slow@example.co.ke", PASSWORD, "Slow");
        h.backend.seed("profiles", profile_row(id, "slow@example.co.ke", json!(true)));
        h.backend.set_profile_delay(Duration::from_secs(60));

        let outcome = h.manager.sign_in(&sign_in_form("slow@example.co.ke", false)).await.unwrap();

        assert_eq!(outcome.snapshot.phase, Phase::Ready);
        assert!(outcome.snapshot.profile.is_none());
        assert_eq!(outcome.snapshot.profile_status, ProfileStatus::TimedOut);
        // Errored profile falls back to the standard dashboard even for admins.
        assert_eq!(outcome.destination, "/dashboard");
    }

    #[tokio::test]
    async fn test_password_reset_mismatch_makes_no_network_call() {
        let h = harness().await;
        let before = h.backend.calls();

        let err = h
            .manager
            .update_password(&PasswordResetForm {
                password: "nyumba123".into(),
                confirm_password: "nyumba321".into(),
            })
            .await
            .unwrap_err();

        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields[0].message, "Passwords do not match");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(h.backend.calls(), before);
    }

    #[tokio::test]
    async fn test_sign_out_clears_both_keys_and_goes_home() {
        let h = harness().await;
        let id = h.backend.with_user("kamau@example.co.ke", PASSWORD, "Kamau");
        h.backend.seed("profiles", profile_row(id, "kamau@example.co.ke", json!(false)));

        h.manager.sign_in(&sign_in_form("kamau@example.co.ke", true)).await.unwrap();
        assert!(h.store.contains(SESSION_KEY).await);
        assert_eq!(h.manager.remembered_email().await.as_deref(), Some("kamau@example.co.ke"));

        let destination = h.manager.sign_out().await.unwrap();

        assert_eq!(destination, "/");
        assert!(!h.store.contains(SESSION_KEY).await);
        assert!(!h.store.contains(REMEMBER_EMAIL_KEY).await);
        assert!(!h.manager.snapshot().await.is_authenticated());
    }

    #[tokio::test]
    async fn test_bad_credentials_get_friendly_message() {
        let h = harness().await;
        h.backend.with_user("njeri@example.co.ke", PASSWORD, "Njeri");
        let err = h
            .manager
            .sign_in(&SignInForm {
                email: "njeri@example.co.ke".into(),
                password: "wrong-password".into(),
                remember_me: false,
            })
            .await
            .unwrap_err();
        match err {
            AppError::Auth(msg) => assert!(msg.contains("incorrect")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_free_profile() {
        let h = harness().await;
        h.backend.with_user("new@example.co.ke", PASSWORD, "Akinyi Odhiambo");

        let outcome = h.manager.sign_in(&sign_in_form("new@example.co.ke", false)).await.unwrap();

        let profile = outcome.snapshot.profile.expect("profile created");
        assert_eq!(profile.tier, Tier::Free);
        assert_eq!(profile.full_name.as_deref(), Some("Akinyi Odhiambo"));
        assert_eq!(h.backend.rows("profiles").len(), 1);
    }

    #[tokio::test]
    async fn test_restore_uses_persisted_session() {
        let h = harness().await;
        let id = h.backend.with_user("resume@example.co.ke", PASSWORD, "Resume");
        h.backend.seed("profiles", profile_row(id, "resume@example.co.ke", json!(false)));
        h.manager.sign_in(&sign_in_form("resume@example.co.ke", false)).await.unwrap();

        let restarted = SessionManager::new(
            h.backend.clone(),
            LocalStore::open(h._dir.path().join("store.json")).await.unwrap(),
            SessionSettings {
                profile_timeout: Duration::from_secs(8),
                site_url: "http://localhost:5173".to_string(),
            },
        );
        restarted.restore().await;

        let snapshot = restarted.snapshot().await;
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.profile.unwrap().id, id);
    }

    fn restarted(h: &Harness) -> SessionManager {
        SessionManager::new(
            h.backend.clone(),
            h.store.clone(),
            SessionSettings {
                profile_timeout: Duration::from_secs(8),
                site_url: "http://localhost:5173".to_string(),
            },
        )
    }

    async fn expire_persisted_session(store: &LocalStore) -> Session {
        let mut session: Session = store.get(SESSION_KEY).await.unwrap();
        session.expires_at = Some(Utc::now().timestamp() - 600);
        store.set(SESSION_KEY, &session).await.unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_waits_for_profile_during_restore() {
        use crate::routing::{guard, Decision};

        let h = harness().await;
        let id = h.backend.with_user("admin@makazi.co.ke", PASSWORD, "Admin");
        h.backend.seed("profiles", profile_row(id, "admin@makazi.co.ke", json!(true)));
        h.manager.sign_in(&sign_in_form("admin@makazi.co.ke", false)).await.unwrap();
        h.backend.set_profile_delay(Duration::from_secs(3));

        let manager = restarted(&h);
        let restoring = tokio::spawn({
            let manager = manager.clone();
            async move { manager.restore().await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Loading);
        assert_eq!(guard("/admin", &snapshot), Decision::Loading);

        restoring.await.unwrap();
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Ready);
        assert_eq!(guard("/admin", &snapshot), Decision::Render { page: "admin_dashboard" });
    }

    #[tokio::test]
    async fn test_expired_persisted_session_is_refreshed_once() {
        let h = harness().await;
        let id = h.backend.with_user("wafula@example.co.ke", PASSWORD, "Wafula");
        h.backend.seed("profiles", profile_row(id, "wafula@example.co.ke", json!(false)));
        h.manager.sign_in(&sign_in_form("wafula@example.co.ke", false)).await.unwrap();
        let expired = expire_persisted_session(&h.store).await;

        let manager = restarted(&h);
        manager.restore().await;

        let snapshot = manager.snapshot().await;
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.profile.map(|p| p.id), Some(id));
        let persisted: Session = h.store.get(SESSION_KEY).await.unwrap();
        assert_ne!(persisted.access_token, expired.access_token);
        assert!(!persisted.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_expired_session_that_cannot_refresh_is_cleared() {
        let h = harness().await;
        let id = h.backend.with_user("chebet@example.co.ke", PASSWORD, "Chebet");
        h.backend.seed("profiles", profile_row(id, "chebet@example.co.ke", json!(false)));
        h.manager.sign_in(&sign_in_form("chebet@example.co.ke", false)).await.unwrap();
        expire_persisted_session(&h.store).await;
        h.backend.set_session(None).await;

        let manager = restarted(&h);
        manager.restore().await;

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Ready);
        assert!(!snapshot.is_authenticated());
        assert!(!h.store.contains(SESSION_KEY).await);
    }

    #[tokio::test]
    async fn test_unreadable_persisted_session_is_removed() {
        let h = harness().await;
        h.store.set(SESSION_KEY, &json!({ "access_token": 5 })).await.unwrap();

        h.manager.restore().await;

        let snapshot = h.manager.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Ready);
        assert!(!snapshot.is_authenticated());
        assert!(!h.store.contains(SESSION_KEY).await);
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let h = harness().await;
        let outcome = h
            .manager
            .sign_up(&SignUpForm {
                full_name: "Baraka Mutua".into(),
                email: "baraka@example.co.ke".into(),
                password: "nyumba123".into(),
                confirm_password: "nyumba123".into(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmEmail { .. }));
        assert!(!h.manager.snapshot().await.is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_up_with_autoconfirm_signs_in() {
        let h = harness().await;
        h.backend.auto_confirm();
        let outcome = h
            .manager
            .sign_up(&SignUpForm {
                full_name: "Baraka Mutua".into(),
                email: "baraka@example.co.ke".into(),
                password: "nyumba123".into(),
                confirm_password: "nyumba123".into(),
            })
            .await
            .unwrap();
        match outcome {
            SignUpOutcome::SignedIn { destination } => assert_eq!(destination, "/dashboard"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.backend.rows("profiles").len(), 1);
    }

    #[tokio::test]
    async fn test_profile_feed_refetches_on_change() {
        let h = harness().await;
        let id = h.backend.with_user("feed@example.co.ke", PASSWORD, "Feed");
        h.backend.seed("profiles", profile_row(id, "feed@example.co.ke", json!(false)));
        h.manager.sign_in(&sign_in_form("feed@example.co.ke", false)).await.unwrap();

        h.backend
            .update(
                None,
                &Query::table("profiles").eq("id", id),
                json!({ "tier": "Professional" }),
            )
            .await
            .unwrap();

        let mut tier = None;
        for _ in 0..50 {
            tier = h.manager.snapshot().await.profile.map(|p| p.tier);
            if tier == Some(Tier::Professional) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(tier, Some(Tier::Professional));
    }

    #[tokio::test]
    async fn test_oauth_url_keeps_only_safe_redirects() {
        let h = harness().await;
        let url = h.manager.oauth_url(OAuthProvider::Google, Some("//evil.example"));
        assert!(url.contains(&*urlencoding::encode("http://localhost:5173/dashboard")));
    }
}
