use axum::{
    Extension, Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use oselya_types::api::{FieldErrors, ProfileForm, ProfileView};

use crate::auth::{AppState, AppStateInner, blocking};
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::negotiate::{Negotiated, RequestMode};

const NAME_MAX: usize = 150;
const FULL_NAME_MAX: usize = 120;
const PHONE_MAX: usize = 50;

/// Current profile. When the account has no first/last name yet, they are
/// recovered from the profile's full name.
pub fn profile(s: &AppStateInner, user_id: i64) -> Result<ProfileView, ApiError> {
    let user = s.db.get_user_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    let profile = s.db.get_profile(user_id)?;

    let (first_name, last_name) = if user.first_name.is_empty() && user.last_name.is_empty() {
        let full = profile.full_name.trim();
        match full.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.to_string()),
            None => (full.to_string(), String::new()),
        }
    } else {
        (user.first_name, user.last_name)
    };

    Ok(ProfileView {
        user_id: user.id,
        username: user.username,
        email: user.email,
        first_name,
        last_name,
        full_name: profile.full_name,
        phone: profile.phone,
        avatar: profile.avatar,
        last_seen_at: profile.last_seen_at,
    })
}

pub fn update_profile(s: &AppStateInner, user_id: i64, form: &ProfileForm) -> Result<ProfileView, ApiError> {
    let first = form.first_name.trim();
    let last = form.last_name.trim();
    let phone = form.phone.trim();

    let mut errors = FieldErrors::new();
    for (field, value, max) in [
        ("first_name", first, NAME_MAX),
        ("last_name", last, NAME_MAX),
        ("phone", phone, PHONE_MAX),
    ] {
        if value.chars().count() > max {
            errors.insert(field.to_string(), vec![format!("Не більше {max} символів.")]);
        }
    }
    if format!("{first} {last}").trim().chars().count() > FULL_NAME_MAX {
        errors
            .entry("last_name".to_string())
            .or_default()
            .push(format!("Ім'я та прізвище разом не більше {FULL_NAME_MAX} символів."));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    s.db.update_profile(user_id, first, last, phone)?;
    info!("User {} updated their profile", user_id);
    profile(s, user_id)
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let view = blocking(&state, move |s| profile(s, claims.sub)).await?;
    Ok(Json(view))
}

pub async fn save_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mode: RequestMode,
    Form(form): Form<ProfileForm>,
) -> Result<Response, ApiError> {
    let view = blocking(&state, move |s| update_profile(s, claims.sub, &form)).await?;
    Ok(Negotiated::ok(StatusCode::OK, view, "/cabinet/").respond(mode))
}
