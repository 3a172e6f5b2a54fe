pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};

use crate::admin::handlers as admin;
use crate::dashboard::handlers as dashboard;
use crate::forms::handlers as forms;
use crate::forms::listing::MAX_UPLOAD_BYTES;
use crate::routing::handlers as navigation;
use crate::session::handlers as auth;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/v1/auth/sign-in", post(auth::handle_sign_in))
        .route("/api/v1/auth/sign-up", post(auth::handle_sign_up))
        .route("/api/v1/auth/sign-out", post(auth::handle_sign_out))
        .route("/api/v1/auth/session", get(auth::handle_session))
        .route(
            "/api/v1/auth/password/forgot",
            post(auth::handle_forgot_password),
        )
        .route(
            "/api/v1/auth/password/reset",
            post(auth::handle_reset_password),
        )
        .route("/api/v1/auth/oauth/:provider", get(auth::handle_oauth_url))
        .route(
            "/api/v1/auth/remembered-email",
            get(auth::handle_remembered_email),
        )
        .route("/api/v1/navigation", get(navigation::handle_navigation))
        // Profile
        .route(
            "/api/v1/profile",
            get(auth::handle_get_profile).patch(forms::handle_update_profile),
        )
        .route("/api/v1/profile/refresh", post(auth::handle_refresh_profile))
        // Dashboard
        .route("/api/v1/quotes", get(dashboard::handle_my_quotes))
        .route(
            "/api/v1/calendar",
            get(dashboard::handle_list_events).post(dashboard::handle_create_event),
        )
        .route("/api/v1/calendar/reminders", get(dashboard::handle_reminders))
        .route(
            "/api/v1/listings",
            get(dashboard::handle_search_listings).post(forms::handle_create_listing),
        )
        .route("/api/v1/listings/mine", get(dashboard::handle_my_listings))
        .route("/api/v1/listings/:id", get(dashboard::handle_get_listing))
        .route(
            "/api/v1/listings/:id/images",
            post(forms::handle_upload_images).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/v1/listings/:id/images/:name",
            get(forms::handle_get_image),
        )
        .route(
            "/api/v1/payments",
            get(dashboard::handle_my_payments).post(forms::handle_record_payment),
        )
        .route(
            "/api/v1/applications",
            get(dashboard::handle_my_applications).post(forms::handle_submit_application),
        )
        // Admin
        .route("/api/v1/admin/dashboard", get(admin::handle_dashboard))
        .route("/api/v1/admin/users", get(admin::handle_list_users))
        .route(
            "/api/v1/admin/users/:id",
            delete(admin::handle_delete_user),
        )
        .route("/api/v1/admin/users/:id/tier", patch(admin::handle_set_tier))
        .route(
            "/api/v1/admin/users/:id/admin",
            patch(admin::handle_set_admin),
        )
        .route(
            "/api/v1/admin/users/:id/verification",
            get(admin::handle_verification),
        )
        .route("/api/v1/admin/quotes", get(admin::handle_list_quotes))
        .route("/api/v1/admin/tiers", get(admin::handle_list_tiers))
        .route("/api/v1/admin/tiers/:id", patch(admin::handle_update_tier))
        .with_state(state)
}
