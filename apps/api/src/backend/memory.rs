//! In-memory `Backend` used by tests. Behaves like the hosted service closely
//! enough for session, form and admin flows, and broadcasts change events to
//! subscribers on every write.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::query::Op;
use super::{
    Backend, BackendError, ChangeEvent, ChangeKind, ChangeStream, Filter, OAuthProvider, Query,
    SignUp,
};
use crate::models::auth::{AuthUser, Session};

struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    tables: HashMap<String, Vec<Value>>,
    objects: HashMap<String, Bytes>,
    current: Option<Session>,
    subscribers: Vec<(String, Option<Filter>, mpsc::Sender<ChangeEvent>)>,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
    profile_delay: Mutex<Option<Duration>>,
    fail_session_lookup: Mutex<bool>,
    auto_confirm: Mutex<bool>,
}

fn api_error(status: u16, message: &str) -> BackendError {
    BackendError::Api {
        status,
        message: message.to_string(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn matches(filter: &Filter, row: &Value) -> bool {
    let actual = scalar(row.get(&filter.column).unwrap_or(&Value::Null));
    match filter.op {
        Op::Eq | Op::Is => actual == filter.value,
        Op::Neq => actual != filter.value,
        Op::Gt => compare(&actual, &filter.value) == Ordering::Greater,
        Op::Gte => compare(&actual, &filter.value) != Ordering::Less,
        Op::Lt => compare(&actual, &filter.value) == Ordering::Less,
        Op::Lte => compare(&actual, &filter.value) != Ordering::Greater,
        Op::In => filter.value.split(',').any(|v| v.trim() == actual),
    }
}

fn matches_all(query: &Query, row: &Value) -> bool {
    query.filters().iter().all(|f| matches(f, row))
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a confirmed account and returns its user id.
    pub fn with_user(&self, email: &str, password: &str, full_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let user = AuthUser {
            id,
            email: Some(email.to_string()),
            email_confirmed_at: Some(Utc::now()),
            created_at: Some(Utc::now()),
            user_metadata: json!({ "full_name": full_name }),
        };
        self.inner.lock().unwrap().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user,
            },
        );
        id
    }

    pub fn seed(&self, table: &str, row: Value) {
        self.inner
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    /// Number of backend calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Makes reads of `profiles` hang for `delay` before answering.
    pub fn set_profile_delay(&self, delay: Duration) {
        *self.profile_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_session_lookup(&self) {
        *self.fail_session_lookup.lock().unwrap() = true;
    }

    pub fn auto_confirm(&self) {
        *self.auto_confirm.lock().unwrap() = true;
    }

    pub fn issue_session(user: &AuthUser, lifetime_secs: i64) -> Session {
        Session {
            access_token: format!("access-{}", Uuid::new_v4()),
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            token_type: "bearer".to_string(),
            expires_at: Some(Utc::now().timestamp() + lifetime_secs),
            expires_in: None,
            user: user.clone(),
        }
    }

    fn touch(&self) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn publish(inner: &mut Inner, table: &str, event: ChangeEvent) {
        let subject = event
            .record
            .as_ref()
            .or(event.old_record.as_ref())
            .cloned()
            .unwrap_or(Value::Null);
        inner.subscribers.retain(|(sub_table, filter, tx)| {
            let wanted = sub_table == table
                && filter.as_ref().map(|f| matches(f, &subject)).unwrap_or(true);
            if wanted {
                let _ = tx.try_send(event.clone());
            }
            !tx.is_closed()
        });
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.touch();
        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get(email)
            .filter(|a| a.password == password)
            .ok_or_else(|| api_error(400, "Invalid login credentials"))?;
        if !account.user.is_email_verified() {
            return Err(api_error(400, "Email not confirmed"));
        }
        let session = Self::issue_session(&account.user, 3600);
        inner.current = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUp, BackendError> {
        self.touch();
        let confirmed = *self.auto_confirm.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.contains_key(email) {
            return Err(api_error(422, "User already registered"));
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            email_confirmed_at: confirmed.then(Utc::now),
            created_at: Some(Utc::now()),
            user_metadata: metadata,
        };
        inner.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        let session = confirmed.then(|| Self::issue_session(&user, 3600));
        if session.is_some() {
            inner.current = session.clone();
        }
        Ok(SignUp { user, session })
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), BackendError> {
        self.touch();
        self.inner.lock().unwrap().current = None;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.touch();
        if *self.fail_session_lookup.lock().unwrap() {
            return Err(api_error(503, "Service unavailable"));
        }
        Ok(self.inner.lock().unwrap().current.clone())
    }

    async fn set_session(&self, session: Option<Session>) {
        self.inner.lock().unwrap().current = session;
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.touch();
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .current
            .as_ref()
            .filter(|s| s.refresh_token == refresh_token)
            .map(|s| s.user.clone())
            .ok_or_else(|| api_error(400, "Invalid Refresh Token: Refresh Token Not Found"))?;
        let session = Self::issue_session(&user, 3600);
        inner.current = Some(session.clone());
        Ok(session)
    }

    async fn send_password_reset(
        &self,
        _email: &str,
        _redirect_to: &str,
    ) -> Result<(), BackendError> {
        self.touch();
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<(), BackendError> {
        self.touch();
        let mut inner = self.inner.lock().unwrap();
        let email = inner
            .current
            .as_ref()
            .filter(|s| s.access_token == access_token)
            .and_then(|s| s.user.email.clone())
            .ok_or_else(|| api_error(401, "invalid JWT"))?;
        if let Some(account) = inner.accounts.get_mut(&email) {
            account.password = password.to_string();
        }
        Ok(())
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        format!(
            "memory://authorize?provider={}&redirect_to={}",
            provider.as_str(),
            urlencoding::encode(redirect_to)
        )
    }

    async fn select(&self, _token: Option<&str>, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.touch();
        if query.table_name() == "profiles" {
            let delay = *self.profile_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
        let mut rows: Vec<Value> = self
            .rows(query.table_name())
            .into_iter()
            .filter(|row| matches_all(query, row))
            .collect();
        for order in query.ordering().iter().rev() {
            rows.sort_by(|a, b| {
                let x = scalar(a.get(&order.column).unwrap_or(&Value::Null));
                let y = scalar(b.get(&order.column).unwrap_or(&Value::Null));
                let ord = compare(&x, &y);
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(
        &self,
        _token: Option<&str>,
        table: &str,
        mut row: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.touch();
        let obj = row
            .as_object_mut()
            .ok_or_else(|| api_error(400, "row must be an object"))?;
        obj.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        obj.entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let mut inner = self.inner.lock().unwrap();
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Self::publish(
            &mut inner,
            table,
            ChangeEvent {
                table: table.to_string(),
                kind: ChangeKind::Insert,
                record: Some(row.clone()),
                old_record: None,
                commit_timestamp: Some(Utc::now().to_rfc3339()),
            },
        );
        Ok(vec![row])
    }

    async fn update(
        &self,
        _token: Option<&str>,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.touch();
        let patch = patch
            .as_object()
            .cloned()
            .ok_or_else(|| api_error(400, "patch must be an object"))?;
        let mut inner = self.inner.lock().unwrap();
        let mut changed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(query.table_name()) {
            for row in rows.iter_mut().filter(|row| matches_all(query, row)) {
                let old = row.clone();
                if let Some(obj) = row.as_object_mut() {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                changed.push((old, row.clone()));
            }
        }
        for (old, new) in &changed {
            Self::publish(
                &mut inner,
                query.table_name(),
                ChangeEvent {
                    table: query.table_name().to_string(),
                    kind: ChangeKind::Update,
                    record: Some(new.clone()),
                    old_record: Some(old.clone()),
                    commit_timestamp: Some(Utc::now().to_rfc3339()),
                },
            );
        }
        Ok(changed.into_iter().map(|(_, new)| new).collect())
    }

    async fn delete(&self, _token: Option<&str>, query: &Query) -> Result<(), BackendError> {
        self.touch();
        let mut inner = self.inner.lock().unwrap();
        let mut removed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(query.table_name()) {
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| matches_all(query, row));
            *rows = kept;
            removed = gone;
        }
        for old in removed {
            Self::publish(
                &mut inner,
                query.table_name(),
                ChangeEvent {
                    table: query.table_name().to_string(),
                    kind: ChangeKind::Delete,
                    record: None,
                    old_record: Some(old),
                    commit_timestamp: Some(Utc::now().to_rfc3339()),
                },
            );
        }
        Ok(())
    }

    async fn upload(
        &self,
        _token: Option<&str>,
        bucket: &str,
        path: &str,
        _content_type: &str,
        body: Bytes,
    ) -> Result<String, BackendError> {
        self.touch();
        let key = format!("{bucket}/{path}");
        let mut inner = self.inner.lock().unwrap();
        if inner.objects.contains_key(&key) {
            return Err(api_error(409, "The resource already exists"));
        }
        inner.objects.insert(key.clone(), body);
        Ok(key)
    }

    async fn download(
        &self,
        _token: Option<&str>,
        bucket: &str,
        path: &str,
    ) -> Result<Bytes, BackendError> {
        self.touch();
        self.object(&format!("{bucket}/{path}"))
            .ok_or_else(|| api_error(404, "Object not found"))
    }

    async fn subscribe(
        &self,
        _token: Option<&str>,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<ChangeStream, BackendError> {
        self.touch();
        let (tx, rx) = mpsc::channel(64);
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .push((table.to_string(), filter, tx));
        Ok(ChangeStream::new(rx, None))
    }

    async fn admin_get_user(&self, user_id: Uuid) -> Result<AuthUser, BackendError> {
        self.touch();
        self.inner
            .lock()
            .unwrap()
            .accounts
            .values()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| api_error(404, "User not found"))
    }

    async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), BackendError> {
        self.touch();
        let mut inner = self.inner.lock().unwrap();
        let before = inner.accounts.len();
        inner.accounts.retain(|_, a| a.user.id != user_id);
        if inner.accounts.len() == before {
            return Err(api_error(404, "User not found"));
        }
        Ok(())
    }
}
