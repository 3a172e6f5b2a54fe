use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{realtime, Backend, BackendError, ChangeStream, Filter, OAuthProvider, Query, SignUp};
use crate::models::auth::{AuthUser, Session};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `Backend` over the hosted service's REST, storage and websocket endpoints.
///
/// Like the vendor SDK, it keeps the current session in process so
/// `current_session` can answer without a round trip.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: Option<String>,
    session: Arc<RwLock<Option<Session>>>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        anon_key: String,
        service_key: Option<String>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_key,
            session: Arc::new(RwLock::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches the public key and a bearer: the user's token if given, else the public key.
    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(&self.anon_key))
    }

    fn privileged(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let key = self
            .service_key
            .as_deref()
            .ok_or(BackendError::PrivilegedUnavailable)?;
        Ok(self
            .client
            .request(method, self.url(path))
            .header("apikey", key)
            .bearer_auth(key))
    }

    async fn store_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }
}

/// Turns a non-2xx response into `BackendError::Api`.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    warn!(status = status.as_u16(), %message, "Backend request failed");
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn send_json(builder: RequestBuilder) -> Result<Value, BackendError> {
    let response = check(builder.send().await?).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// The auth, row and storage services phrase errors differently; pick the
/// human-readable field from whichever shape arrived.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        row => vec![row],
    }
}

fn parse_session(value: Value) -> Result<Session, BackendError> {
    let session: Session = serde_json::from_value(value)?;
    Ok(session.anchored(Utc::now()))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let body = send_json(
            self.request(Method::POST, "/auth/v1/token", None)
                .query(&[("grant_type", "password")])
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;
        let session = parse_session(body)?;
        self.store_session(Some(session.clone())).await;
        info!(user_id = %session.user.id, "Signed in with password");
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<SignUp, BackendError> {
        let body = send_json(
            self.request(Method::POST, "/auth/v1/signup", None)
                .json(&json!({ "email": email, "password": password, "data": metadata })),
        )
        .await?;

        // With autoconfirm the service answers with a full session; otherwise
        // with the bare user awaiting email confirmation.
        if body.get("access_token").is_some() {
            let session = parse_session(body)?;
            self.store_session(Some(session.clone())).await;
            Ok(SignUp {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user_value = body.get("user").cloned().unwrap_or(body);
            Ok(SignUp {
                user: serde_json::from_value(user_value)?,
                session: None,
            })
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.store_session(None).await;
        check(
            self.request(Method::POST, "/auth/v1/logout", Some(access_token))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let current = self.session.read().await.clone();
        match current {
            Some(session) if session.is_expired(Utc::now()) => {
                debug!("In-process session expired, refreshing once");
                match self.refresh_session(&session.refresh_token).await {
                    Ok(fresh) => Ok(Some(fresh)),
                    Err(e) => {
                        self.store_session(None).await;
                        Err(e)
                    }
                }
            }
            other => Ok(other),
        }
    }

    async fn set_session(&self, session: Option<Session>) {
        self.store_session(session).await;
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let body = send_json(
            self.request(Method::POST, "/auth/v1/token", None)
                .query(&[("grant_type", "refresh_token")])
                .json(&json!({ "refresh_token": refresh_token })),
        )
        .await?;
        let session = parse_session(body)?;
        self.store_session(Some(session.clone())).await;
        Ok(session)
    }

    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError> {
        send_json(
            self.request(Method::POST, "/auth/v1/recover", None)
                .query(&[("redirect_to", redirect_to)])
                .json(&json!({ "email": email })),
        )
        .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<(), BackendError> {
        send_json(
            self.request(Method::PUT, "/auth/v1/user", Some(access_token))
                .json(&json!({ "password": password })),
        )
        .await?;
        Ok(())
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}",
            self.base_url,
            provider.as_str(),
            urlencoding::encode(redirect_to)
        )
    }

    async fn select(&self, token: Option<&str>, query: &Query) -> Result<Vec<Value>, BackendError> {
        let path = format!("/rest/v1/{}", query.table_name());
        let body = send_json(
            self.request(Method::GET, &path, token)
                .query(&query.read_params()),
        )
        .await?;
        Ok(into_rows(body))
    }

    async fn insert(
        &self,
        token: Option<&str>,
        table: &str,
        row: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let path = format!("/rest/v1/{table}");
        let body = send_json(
            self.request(Method::POST, &path, token)
                .header("Prefer", "return=representation")
                .json(&row),
        )
        .await?;
        Ok(into_rows(body))
    }

    async fn update(
        &self,
        token: Option<&str>,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let path = format!("/rest/v1/{}", query.table_name());
        let body = send_json(
            self.request(Method::PATCH, &path, token)
                .header("Prefer", "return=representation")
                .query(&query.filter_params())
                .json(&patch),
        )
        .await?;
        Ok(into_rows(body))
    }

    async fn delete(&self, token: Option<&str>, query: &Query) -> Result<(), BackendError> {
        let path = format!("/rest/v1/{}", query.table_name());
        check(
            self.request(Method::DELETE, &path, token)
                .query(&query.filter_params())
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn upload(
        &self,
        token: Option<&str>,
        bucket: &str,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, BackendError> {
        let url_path = format!("/storage/v1/object/{bucket}/{path}");
        let response = send_json(
            self.request(Method::POST, &url_path, token)
                .header("Content-Type", content_type)
                .header("x-upsert", "false")
                .body(body),
        )
        .await?;
        Ok(response
            .get("Key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{bucket}/{path}")))
    }

    async fn download(
        &self,
        token: Option<&str>,
        bucket: &str,
        path: &str,
    ) -> Result<Bytes, BackendError> {
        let url_path = format!("/storage/v1/object/{bucket}/{path}");
        let response = check(self.request(Method::GET, &url_path, token).send().await?).await?;
        Ok(response.bytes().await?)
    }

    async fn subscribe(
        &self,
        token: Option<&str>,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<ChangeStream, BackendError> {
        realtime::subscribe(
            &self.base_url,
            &self.anon_key,
            token.unwrap_or(&self.anon_key),
            table,
            filter,
        )
        .await
    }

    async fn admin_get_user(&self, user_id: Uuid) -> Result<AuthUser, BackendError> {
        let body = send_json(self.privileged(Method::GET, &format!("/auth/v1/admin/users/{user_id}"))?)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), BackendError> {
        check(
            self.privileged(Method::DELETE, &format!("/auth/v1/admin/users/{user_id}"))?
                .send()
                .await?,
        )
        .await?;
        info!(%user_id, "Auth user deleted with service-role key");
        Ok(())
    }
}
