//! Choosing between a JSON body and a redirect for the same action.
//!
//! Browser widgets post with `X-Requested-With: XMLHttpRequest` and expect
//! JSON; plain form posts get a 303 back to a page.

use std::convert::Infallible;

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;

use crate::error::chat_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Ajax,
    Page,
}

impl RequestMode {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ajax = headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
        if ajax { Self::Ajax } else { Self::Page }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMode {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// An action's result in both encodings; the request mode picks one.
pub struct Negotiated {
    json: Response,
    location: String,
}

impl Negotiated {
    pub fn ok(status: StatusCode, body: impl Serialize, location: impl Into<String>) -> Self {
        Self {
            json: (status, Json(body)).into_response(),
            location: location.into(),
        }
    }

    pub fn refused(status: StatusCode, code: &str, location: impl Into<String>) -> Self {
        Self {
            json: chat_error(status, code),
            location: location.into(),
        }
    }

    pub fn respond(self, mode: RequestMode) -> Response {
        match mode {
            RequestMode::Ajax => self.json,
            RequestMode::Page => Redirect::to(&self.location).into_response(),
        }
    }
}

/// Reduce a user-supplied redirect target to a same-site path.
///
/// Relative paths pass through; absolute URLs (a Referer, typically) keep
/// only their path and query. Anything else, including `//host` and
/// backslash tricks, is rejected.
pub fn local_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with('/') {
        if raw.starts_with("//") || raw.contains('\\') {
            return None;
        }
        return Some(raw.to_string());
    }

    let parsed = url::Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let mut target = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        target.push('?');
        target.push_str(query);
    }
    Some(target)
}

/// First usable target among an explicit `next` and the Referer header.
pub fn back_target(next: Option<&str>, headers: &HeaderMap) -> Option<String> {
    next.and_then(local_target).or_else(|| {
        headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(local_target)
    })
}

/// Set `key=value` in the target's query string, replacing any existing
/// value for `key`. Fragments are dropped.
pub fn with_query_param(target: &str, key: &str, value: &str) -> String {
    let target = target.split('#').next().unwrap_or_default();
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        if k != key {
            serializer.append_pair(&k, &v);
        }
    }
    serializer.append_pair(key, value);
    format!("{path}?{}", serializer.finish())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn xhr_header_selects_ajax() {
        let mut headers = HeaderMap::new();
        assert_eq!(RequestMode::from_headers(&headers), RequestMode::Page);
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert_eq!(RequestMode::from_headers(&headers), RequestMode::Ajax);
    }

    #[test]
    fn targets_stay_on_site() {
        assert_eq!(local_target("/listing/3/").as_deref(), Some("/listing/3/"));
        assert_eq!(
            local_target("https://oselya.example/listing/3/?a=1").as_deref(),
            Some("/listing/3/?a=1")
        );
        assert_eq!(local_target("//evil.example/"), None);
        assert_eq!(local_target("/\\evil.example"), None);
        assert_eq!(local_target("javascript:alert(1)"), None);
        assert_eq!(local_target(""), None);
    }

    #[test]
    fn next_wins_over_referer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static("http://host/from/"));
        assert_eq!(back_target(Some("/next/"), &headers).as_deref(), Some("/next/"));
        assert_eq!(back_target(None, &headers).as_deref(), Some("/from/"));
        assert_eq!(back_target(Some("//x"), &HeaderMap::new()), None);
    }

    #[test]
    fn query_param_is_replaced_not_duplicated() {
        assert_eq!(
            with_query_param("/listing/3/", "open_message", "1"),
            "/listing/3/?open_message=1"
        );
        assert_eq!(
            with_query_param("/listing/3/?open_message=0&x=y#chat", "open_message", "1"),
            "/listing/3/?x=y&open_message=1"
        );
    }
}
