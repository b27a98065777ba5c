use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::auth::{self, AppState};
use crate::middleware::{require_auth, track_last_seen};
use crate::{chat, favorites, listings, moderation, notifications, profiles, reports};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Every route of the marketplace, with session handling applied.
///
/// Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/", get(listings::catalog_page))
        .route("/listing/{id}/", get(listings::detail_page))
        .route("/author/{user_id}/", get(listings::author_page))
        .route("/accounts/signup/", post(auth::signup))
        .route("/accounts/login/", post(auth::login))
        .route("/accounts/logout/", post(auth::logout));

    let protected = Router::new()
        .route("/api/me/", get(auth::me))
        .route("/api/badges/", get(favorites::get_badges))
        // Chat
        .route(
            "/listing/{id}/message/",
            get(chat::listing_message_page).post(chat::send_listing_message),
        )
        .route("/cabinet/messages/", get(chat::inbox_page))
        .route(
            "/cabinet/messages/{thread_id}/",
            get(chat::thread_page).post(chat::thread_reply),
        )
        .route("/api/chat/{thread_id}/messages/", get(chat::poll_messages))
        // Reports and favorites
        .route("/listing/{id}/report/", post(reports::report_listing))
        .route("/favorite/{id}/toggle/", post(favorites::toggle_favorite))
        .route("/cabinet/favorites/", get(favorites::list_favorites))
        // Owner dashboard
        .route("/cabinet/", get(listings::dashboard_page))
        .route("/cabinet/new/", post(listings::create))
        .route(
            "/cabinet/{id}/edit/",
            get(listings::edit_page).post(listings::edit),
        )
        .route("/cabinet/{id}/delete/", post(listings::delete))
        .route(
            "/cabinet/profile/",
            get(profiles::get_profile).post(profiles::save_profile),
        )
        .route("/cabinet/notifications/", get(notifications::list_notifications))
        // Staff
        .route("/staff/reports/", get(moderation::list_reports))
        .route(
            "/staff/reports/{id}/moderate/",
            post(moderation::moderate_report),
        )
        .route(
            "/staff/notifications/",
            post(notifications::create_notification),
        )
        .route(
            "/staff/notifications/{id}/deactivate/",
            post(notifications::deactivate_notification),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), track_last_seen))
        .with_state(state)
}
