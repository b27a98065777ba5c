use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::negotiate::RequestMode;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

pub fn create_token(secret: &str, user_id: i64, username: &str, days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Claims from a Bearer header or, failing that, the session cookie.
pub fn session_claims(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let cookie_token = CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string());
    let token = bearer_token(headers)
        .map(str::to_string)
        .or(cookie_token)?;

    decode::<Claims>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Reject requests without a valid session.
///
/// API-style clients (XHR or Bearer) get 401; browsers are sent to the
/// login page with a `next` back to where they were going.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match session_claims(req.headers(), &state.jwt_secret) {
        Some(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        None => {
            let api_client = RequestMode::from_headers(req.headers()) == RequestMode::Ajax
                || bearer_token(req.headers()).is_some();
            if api_client {
                return ApiError::Unauthorized.into_response();
            }
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("next", target)
                .finish();
            Redirect::to(&format!("/accounts/login/?{query}")).into_response()
        }
    }
}

/// Stamp the signed-in user's last-seen time on every request.
pub async fn track_last_seen(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(claims) = session_claims(req.headers(), &state.jwt_secret) {
        let st = state.clone();
        let user_id = claims.sub;
        let result = tokio::task::spawn_blocking(move || {
            let now = st.now();
            st.db.touch_last_seen(user_id, now)
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to update last seen for user {}: {}", user_id, e),
            Err(e) => warn!("spawn_blocking join error: {}", e),
        }
    }
    next.run(req).await
}

/// The signed-in user if there is one. Never rejects.
pub struct Viewer(pub Option<Claims>);

impl Viewer {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|c| c.sub)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(Self(Some(claims.clone())));
        }
        Ok(Self(session_claims(&parts.headers, &state.jwt_secret)))
    }
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        if let Some(ip) = forwarded {
            return Ok(Self(ip));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(peer))
    }
}
