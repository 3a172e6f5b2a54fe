use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a status object with service version and session phase.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "makazi-api",
        "session": snapshot.phase,
        "privileged_ops": state.config.service_role_key.is_some(),
    }))
}
