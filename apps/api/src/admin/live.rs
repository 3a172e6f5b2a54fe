//! Live users view for the admin console.
//!
//! Holds the full profile list and keeps it current from a realtime
//! subscription on `profiles`. Events whose payload decodes are patched into
//! the list; anything else falls back to a full re-fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, ChangeEvent, ChangeKind};
use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::models::{decode_row, Record};

use super::service::list_profiles;

struct Feed {
    token: String,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ViewInner {
    profiles: RwLock<Vec<Profile>>,
    feed: Mutex<Option<Feed>>,
    refetches: AtomicU64,
}

impl Drop for ViewInner {
    fn drop(&mut self) {
        if let Ok(mut feed) = self.feed.lock() {
            if let Some(feed) = feed.take() {
                feed.task.abort();
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct UsersView {
    inner: Arc<ViewInner>,
}

impl UsersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn profiles(&self) -> Vec<Profile> {
        self.inner.profiles.read().await.clone()
    }

    /// Number of full re-fetches since the view was created.
    pub fn refetches(&self) -> u64 {
        self.inner.refetches.load(Ordering::SeqCst)
    }

    fn live_for(&self, token: &str) -> bool {
        self.inner
            .feed
            .lock()
            .map(|feed| {
                feed.as_ref()
                    .map(|f| f.token == token && !f.task.is_finished())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Starts (or restarts for a new token) the subscription and returns the
    /// current list.
    pub async fn ensure_live(
        &self,
        backend: Arc<dyn Backend>,
        token: String,
    ) -> Result<Vec<Profile>, AppError> {
        if self.live_for(&token) {
            return Ok(self.profiles().await);
        }

        // Subscribe before the initial load so no change falls in between.
        let mut stream = backend.subscribe(Some(&token), Profile::TABLE, None).await?;
        let initial = list_profiles(backend.as_ref(), &token).await?;
        *self.inner.profiles.write().await = initial.clone();
        info!(count = initial.len(), "Admin users view is live");

        let weak: Weak<ViewInner> = Arc::downgrade(&self.inner);
        let feed_token = token.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(inner) = weak.upgrade() else { break };
                let view = UsersView { inner };
                let patched = {
                    let mut profiles = view.inner.profiles.write().await;
                    apply_event(&mut profiles, &event)
                };
                if patched {
                    debug!(kind = ?event.kind, "Users view patched in place");
                } else {
                    view.refetch(backend.as_ref(), &feed_token).await;
                }
            }
        });

        self.replace_feed(Some(Feed { token, task }));
        Ok(initial)
    }

    pub fn stop(&self) {
        self.replace_feed(None);
    }

    async fn refetch(&self, backend: &dyn Backend, token: &str) {
        self.inner.refetches.fetch_add(1, Ordering::SeqCst);
        match list_profiles(backend, token).await {
            Ok(profiles) => {
                debug!(count = profiles.len(), "Users view re-fetched");
                *self.inner.profiles.write().await = profiles;
            }
            Err(e) => warn!(error = %e, "Users view re-fetch failed; keeping stale list"),
        }
    }

    fn replace_feed(&self, feed: Option<Feed>) {
        let previous = match self.inner.feed.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, feed),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), feed),
        };
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }
}

fn event_id(event: &ChangeEvent) -> Option<Uuid> {
    event
        .old_record
        .as_ref()
        .or(event.record.as_ref())
        .and_then(|row| row.get("id"))
        .and_then(|id| id.as_str())
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Applies one change to the list. Returns `false` when the event cannot be
/// applied and the list must be re-fetched.
pub fn apply_event(profiles: &mut Vec<Profile>, event: &ChangeEvent) -> bool {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let Some(row) = event.record.clone() else {
                return false;
            };
            let profile: Profile = match decode_row(row) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(error = %e, "Undecodable profile change");
                    return false;
                }
            };
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
            profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            true
        }
        ChangeKind::Delete => match event_id(event) {
            Some(id) => {
                profiles.retain(|p| p.id != id);
                true
            }
            None => false,
        },
    }
}
