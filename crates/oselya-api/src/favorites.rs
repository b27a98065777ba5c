use axum::{
    Extension, Form, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use oselya_types::api::{BadgesResponse, FavoriteView, RedirectForm};
use oselya_types::models::ListingStatus;

use crate::auth::{AppState, AppStateInner, blocking};
use crate::error::ApiError;
use crate::listings::listing_view;
use crate::middleware::Claims;
use crate::negotiate::{Negotiated, RequestMode, back_target};

/// Flip the bookmark on a published listing. Returns the new state.
pub fn toggle(s: &AppStateInner, user_id: i64, listing_id: i64) -> Result<bool, ApiError> {
    let listing = s
        .db
        .get_listing(listing_id)?
        .filter(|l| l.fields.status == ListingStatus::Published)
        .ok_or(ApiError::NotFound)?;
    Ok(s.db.toggle_favorite(user_id, listing.id, s.now())?)
}

pub fn favorites(s: &AppStateInner, user_id: i64) -> Result<Vec<FavoriteView>, ApiError> {
    let rows = s.db.favorites_for(user_id)?;
    Ok(rows
        .iter()
        .map(|f| FavoriteView {
            listing: listing_view(&f.listing),
            created_at: f.created_at,
        })
        .collect())
}

/// Header counters shown on every signed-in page.
pub fn badges(s: &AppStateInner, user_id: i64) -> Result<BadgesResponse, ApiError> {
    Ok(BadgesResponse {
        favorites_count: s.db.favorites_count(user_id)?,
        unread_messages_count: s.db.unread_count(user_id)?,
    })
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(listing_id): Path<i64>,
    mode: RequestMode,
    headers: HeaderMap,
    Form(form): Form<RedirectForm>,
) -> Result<Response, ApiError> {
    let is_favorite = blocking(&state, move |s| toggle(s, claims.sub, listing_id)).await?;
    let back = back_target(form.next.as_deref(), &headers).unwrap_or_else(|| "/".to_string());
    Ok(Negotiated::ok(
        StatusCode::OK,
        json!({ "ok": true, "is_favorite": is_favorite }),
        back,
    )
    .respond(mode))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let items = blocking(&state, move |s| favorites(s, claims.sub)).await?;
    Ok(Json(items))
}

pub async fn get_badges(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = blocking(&state, move |s| badges(s, claims.sub)).await?;
    Ok(Json(counts))
}
