//! End-to-end request tests against the full router with an in-memory
//! database and a hand-driven clock.

use std::sync::Arc;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use oselya_api::clock::{Clock, ManualClock};
use oselya_api::middleware::create_token;
use oselya_api::throttle::{LoginThrottle, MemoryCounterStore, ThrottlePolicy};
use oselya_api::{AppState, AppStateInner, router};
use oselya_db::Database;
use oselya_db::models::ListingFields;
use oselya_types::models::{ListingStatus, Rooms};

const SECRET: &str = "integration-secret";

struct TestApp {
    state: AppState,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryCounterStore::new(clock.clone()));
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.into(),
            session_days: 1,
            throttle: LoginThrottle::new(store, ThrottlePolicy::default()),
            clock: clock.clone(),
        });
        Self { state, clock }
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }

    fn user(&self, username: &str, password: &str) -> (i64, String) {
        let params = Params::new(8, 1, 1, None).unwrap();
        let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
            .unwrap()
            .to_string();
        let id = self
            .state
            .db
            .create_user(username, &format!("{username}@example.com"), &hash, self.clock.now())
            .unwrap();
        let token = create_token(SECRET, id, username, 1).unwrap();
        (id, token)
    }

    fn listing(&self, owner: i64, title: &str) -> i64 {
        let fields = ListingFields {
            title: title.into(),
            address: "Одеса, вул. Дерибасівська, 10".into(),
            price_per_month: Decimal::new(2_000_000, 2),
            floor: Some(2),
            total_floors: Some(5),
            heating: None,
            pets: None,
            rooms: Rooms::One,
            area_sqm: None,
            description: String::new(),
            contact_name: "Owner".into(),
            contact_phone: String::new(),
            contact_email: String::new(),
            status: ListingStatus::Published,
        };
        self.state
            .db
            .insert_listing(Some(owner), &fields, self.clock.now())
            .unwrap()
    }
}

fn form_post(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn ajax(mut req: Request<Body>) -> Request<Body> {
    req.headers_mut()
        .insert("x-requested-with", "XMLHttpRequest".parse().unwrap());
    req
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn chat_send_and_poll_round_trip() {
    let t = TestApp::new();
    let (owner, owner_token) = t.user("owner", "owner-pass");
    let (_, tenant_token) = t.user("tenant", "tenant-pass");
    let flat = t.listing(owner, "Flat");

    let mut thread_id = 0;
    for text in ["one", "two", "three"] {
        let response = t
            .app()
            .oneshot(ajax(form_post(
                &format!("/listing/{flat}/message/"),
                Some(&tenant_token),
                &format!("message_text={text}"),
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["message"]["is_me"], true);
        thread_id = body["thread_id"].as_i64().unwrap();
        t.clock.advance(Duration::seconds(1));
    }

    let badges = json_body(t.app().oneshot(get("/api/badges/", Some(&owner_token))).await.unwrap()).await;
    assert_eq!(badges["unread_messages_count"], 3);

    let response = t
        .app()
        .oneshot(get(
            &format!("/api/chat/{thread_id}/messages/?after_id=0"),
            Some(&owner_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let texts: Vec<_> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, ["one", "two", "three"]);
    assert_eq!(body["messages"][0]["is_me"], false);

    let badges = json_body(t.app().oneshot(get("/api/badges/", Some(&owner_token))).await.unwrap()).await;
    assert_eq!(badges["unread_messages_count"], 0);
}

#[tokio::test]
async fn chat_refusals_are_encoded_per_client() {
    let t = TestApp::new();
    let (owner, owner_token) = t.user("owner", "owner-pass");
    let (tenant, tenant_token) = t.user("tenant", "tenant-pass");
    let (_, stranger_token) = t.user("stranger", "stranger-pass");
    let flat = t.listing(owner, "Flat");
    let uri = format!("/listing/{flat}/message/");

    let own = t
        .app()
        .oneshot(ajax(form_post(&uri, Some(&owner_token), "message_text=hi")))
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(own).await["error"], "forbidden");

    let empty = t
        .app()
        .oneshot(ajax(form_post(&uri, Some(&tenant_token), "message_text=%20%20")))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(empty).await["error"], "empty_message");

    // A plain form post is redirected back with the chat modal reopened.
    let page = t
        .app()
        .oneshot(form_post(
            &uri,
            Some(&tenant_token),
            "message_text=hello&next=%2Flisting%2F1%2F%3Fsort%3Dnew",
        ))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&page), "/listing/1/?sort=new&open_message=1");

    let thread_id = t.state.db.find_thread(flat, owner, tenant).unwrap().unwrap();
    let outsider = t
        .app()
        .oneshot(get(
            &format!("/api/chat/{thread_id}/messages/"),
            Some(&stranger_token),
        ))
        .await
        .unwrap();
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn anonymous_requests_are_sent_to_login_or_refused() {
    let t = TestApp::new();

    let page = t.app().oneshot(get("/cabinet/messages/?tab=unread", None)).await.unwrap();
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&page),
        "/accounts/login/?next=%2Fcabinet%2Fmessages%2F%3Ftab%3Dunread"
    );

    let api = t
        .app()
        .oneshot(ajax(get("/api/chat/1/messages/", None)))
        .await
        .unwrap();
    assert_eq!(api.status(), StatusCode::UNAUTHORIZED);

    let catalog = t.app().oneshot(get("/", None)).await.unwrap();
    assert_eq!(catalog.status(), StatusCode::OK);
}

fn login_request(ip: &str, username: &str, password: &str) -> Request<Body> {
    let mut req = form_post(
        "/accounts/login/",
        None,
        &format!("username={username}&password={password}&next=%2Fcabinet%2Fmessages%2F"),
    );
    req.headers_mut()
        .insert("x-forwarded-for", ip.parse().unwrap());
    req
}

#[tokio::test]
async fn login_sets_session_and_locks_after_repeated_failures() {
    let t = TestApp::new();
    t.user("olena", "right-pass");

    let ok = t
        .app()
        .oneshot(login_request("10.0.0.1", "olena", "right-pass"))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&ok), "/cabinet/messages/");
    let cookie = ok
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with("session="));

    for _ in 0..10 {
        t.clock.advance(Duration::seconds(61));
        let bad = t
            .app()
            .oneshot(login_request("10.0.0.2", "olena", "wrong"))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    t.clock.advance(Duration::seconds(61));
    let locked = t
        .app()
        .oneshot(login_request("10.0.0.2", "olena", "right-pass"))
        .await
        .unwrap();
    assert_eq!(locked.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(locked).await;
    assert!(body["errors"]["__all__"][0]
        .as_str()
        .unwrap()
        .contains("тимчасово заблоковано"));

    t.clock.advance(Duration::seconds(15 * 60));
    let unlocked = t
        .app()
        .oneshot(login_request("10.0.0.2", "olena", "right-pass"))
        .await
        .unwrap();
    assert_eq!(unlocked.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn ip_budget_is_five_attempts_per_window() {
    let t = TestApp::new();
    t.user("olena", "right-pass");
    for _ in 0..5 {
        let response = t
            .app()
            .oneshot(login_request("10.0.0.3", "olena", "wrong"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    let throttled = t
        .app()
        .oneshot(login_request("10.0.0.3", "olena", "right-pass"))
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn favorite_toggle_redirects_back() {
    let t = TestApp::new();
    let (owner, _) = t.user("owner", "owner-pass");
    let (_, fan_token) = t.user("fan", "fan-pass-1");
    let flat = t.listing(owner, "Flat");

    let response = t
        .app()
        .oneshot(form_post(
            &format!("/favorite/{flat}/toggle/"),
            Some(&fan_token),
            "next=%2F%3Frooms%3D1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?rooms=1");

    let catalog = json_body(t.app().oneshot(get("/", Some(&fan_token))).await.unwrap()).await;
    assert_eq!(catalog["favorite_ids"][0], flat);

    let again = t
        .app()
        .oneshot(ajax(form_post(
            &format!("/favorite/{flat}/toggle/"),
            Some(&fan_token),
            "",
        )))
        .await
        .unwrap();
    assert_eq!(json_body(again).await["is_favorite"], false);
}

#[tokio::test]
async fn staff_moderation_blocks_listing() {
    let t = TestApp::new();
    let (owner, _) = t.user("owner", "owner-pass");
    let (_, reporter_token) = t.user("reporter", "reporter-pass");
    let (_, staff_token) = t.user("moderator", "moderator-pass");
    t.state.db.set_staff("moderator", true).unwrap();
    let flat = t.listing(owner, "Flat");

    let filed = t
        .app()
        .oneshot(ajax(form_post(
            &format!("/listing/{flat}/report/"),
            Some(&reporter_token),
            "reason=fraud&description=fake",
        )))
        .await
        .unwrap();
    assert_eq!(filed.status(), StatusCode::CREATED);
    let report_id = json_body(filed).await["report_id"].as_i64().unwrap();

    let forbidden = t
        .app()
        .oneshot(get("/staff/reports/", Some(&reporter_token)))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let moderate = Request::builder()
        .method("POST")
        .uri(format!("/staff/reports/{report_id}/moderate/"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {staff_token}"))
        .body(Body::from(r#"{"status":"approved","moderation_reason":"підроблені фото"}"#))
        .unwrap();
    let response = t.app().oneshot(moderate).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["listing_blocked"], true);
    assert_eq!(body["notifications_sent"], 2);
    assert_eq!(body["report"]["moderation_status"], "approved");

    let feed = json_body(
        t.app()
            .oneshot(get("/cabinet/notifications/", Some(&reporter_token)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(feed[0]["title"], "Скаргу підтверджено");

    let detail = t.app().oneshot(get(&format!("/listing/{flat}/"), None)).await.unwrap();
    assert_eq!(detail.status(), StatusCode::OK);
    let catalog = json_body(t.app().oneshot(get("/", None)).await.unwrap()).await;
    assert!(catalog["listings"].as_array().unwrap().is_empty());
}
