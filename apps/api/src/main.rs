mod admin;
mod backend;
mod config;
mod dashboard;
mod errors;
mod forms;
mod models;
mod routes;
mod routing;
mod session;
mod state;
mod timeout;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::admin::live::UsersView;
use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::config::Config;
use crate::routes::build_router;
use crate::session::store::LocalStore;
use crate::session::{SessionManager, SessionSettings};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Makazi API v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(
        &config.backend_url,
        config.backend_anon_key.clone(),
        config.service_role_key.clone(),
    )?);
    info!(backend_url = %config.backend_url, "Backend client initialized");
    if config.service_role_key.is_none() {
        warn!("No service-role key configured; account deletion and verification lookups are disabled");
    }

    let store = LocalStore::open(config.store_path.clone()).await?;
    info!(path = %config.store_path.display(), "Local store opened");

    let session = SessionManager::new(
        backend.clone(),
        store,
        SessionSettings {
            profile_timeout: config.profile_fetch_timeout,
            site_url: config.site_url.clone(),
        },
    );

    // Restore runs in the background; the guard answers `loading` until it ends.
    let restoring = session.clone();
    tokio::spawn(async move { restoring.restore().await });

    let state = AppState {
        config: config.clone(),
        backend,
        session,
        users_view: UsersView::new(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict to MAKAZI_SITE_URL once the view layer is deployed separately

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
