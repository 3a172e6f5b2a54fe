use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::routing::{guard, Decision};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NavigationQuery {
    pub path: String,
}

/// GET /api/v1/navigation?path=/pay-rent
pub async fn handle_navigation(
    State(state): State<AppState>,
    Query(params): Query<NavigationQuery>,
) -> Json<Decision> {
    let snapshot = state.session.snapshot().await;
    Json(guard(&params.path, &snapshot))
}
