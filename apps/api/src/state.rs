use std::sync::Arc;

use crate::admin::live::UsersView;
use crate::backend::Backend;
use crate::config::Config;
use crate::session::SessionManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub session: SessionManager,
    /// Admin users list kept current by a realtime feed while an admin is signed in.
    pub users_view: UsersView,
}
