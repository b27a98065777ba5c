use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use oselya_db::{Database, models::UserRow};
use oselya_types::api::{
    FieldErrors, FormErrorResponse, LoginForm, NON_FIELD_ERRORS, RedirectForm, SignupForm,
    SignupResponse,
};

use crate::clock::Clock;
use crate::error::ApiError;
use crate::middleware::{Claims, ClientIp, SESSION_COOKIE, create_token};
use crate::negotiate::{Negotiated, RequestMode, local_target};
use crate::throttle::LoginThrottle;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub session_days: i64,
    pub throttle: LoginThrottle,
    pub clock: Arc<dyn Clock>,
}

impl AppStateInner {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Run synchronous database work on the blocking pool.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let st = state.clone();
    tokio::task::spawn_blocking(move || f(&st))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed"))
        })?
}

pub const MSG_IP_THROTTLED: &str =
    "Занадто багато спроб входу з вашої IP-адреси. Спробуйте через хвилину.";
pub const MSG_LOCKED: &str =
    "Акаунт тимчасово заблоковано через багато невдалих спроб входу. Спробуйте пізніше.";
pub const MSG_BAD_CREDENTIALS: &str =
    "Невірний логін або пароль. Перевірте введені дані та спробуйте ще раз.";
const MSG_REQUIRED: &str = "Обов'язкове поле.";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Unparseable password hash in database: {}", e);
            false
        }
    }
}

// -- Signup --

fn valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (3..=150).contains(&len)
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn push(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

pub fn register_user(s: &AppStateInner, form: &SignupForm) -> Result<SignupResponse, ApiError> {
    let username = form.username.trim();
    let email = form.email.trim().to_lowercase();
    let email = email.as_str();
    let mut errors = FieldErrors::new();

    if !valid_username(username) {
        push(
            &mut errors,
            "username",
            "Від 3 до 150 символів: літери, цифри та @/./+/-/_.",
        );
    } else if s.db.get_user_by_username(username)?.is_some() {
        push(&mut errors, "username", "Користувач з таким іменем вже існує.");
    }

    let (local, domain) = email.split_once('@').unwrap_or(("", ""));
    if local.is_empty() || !domain.contains('.') || email.chars().any(char::is_whitespace) {
        push(&mut errors, "email", "Введіть коректну адресу електронної пошти.");
    } else if s.db.email_taken(email)? {
        push(&mut errors, "email", "Користувач з такою поштою вже існує.");
    }

    if form.password.chars().count() < 8 {
        push(&mut errors, "password", "Пароль має містити щонайменше 8 символів.");
    }
    if form.password != form.password_confirm {
        push(&mut errors, "password_confirm", "Паролі не збігаються.");
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let password_hash = hash_password(&form.password)?;
    let user_id = insert_account(s, username, email, &password_hash)?;
    info!("Registered user {} ({})", username, user_id);

    Ok(SignupResponse {
        user_id,
        username: username.to_string(),
    })
}

/// Create the account row. A concurrent signup can take the name or the
/// address between the checks above and the insert.
fn insert_account(
    s: &AppStateInner,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<i64, ApiError> {
    s.db.create_user(username, email, password_hash, s.now())
        .map_err(|e| match oselya_db::unique_violation(&e) {
            Some(msg) if msg.contains("email") => {
                ApiError::field("email", "Користувач з такою поштою вже існує.")
            }
            Some(_) => ApiError::field("username", "Користувач з таким іменем вже існує."),
            None => e.into(),
        })
}

pub async fn signup(
    State(state): State<AppState>,
    mode: RequestMode,
    Form(form): Form<SignupForm>,
) -> Result<Response, ApiError> {
    let created = blocking(&state, move |s| register_user(s, &form)).await?;
    Ok(Negotiated::ok(StatusCode::CREATED, created, "/accounts/login/").respond(mode))
}

// -- Login --

#[derive(Debug)]
pub enum LoginOutcome {
    Success { user_id: i64, username: String },
    /// The client IP has exhausted its attempt budget.
    Throttled,
    /// This (IP, username) pair is locked after repeated failures.
    Locked,
    Invalid(FieldErrors),
}

/// Check credentials under the throttle's rules.
///
/// Every call spends one unit of the IP's budget. A failed check against a
/// non-empty username counts towards that pair's lock; a success clears it.
pub fn attempt_login(s: &AppStateInner, ip: &str, form: &LoginForm) -> Result<LoginOutcome, ApiError> {
    let username = form.username.trim();

    if !s.throttle.allow_attempt(ip) {
        return Ok(LoginOutcome::Throttled);
    }
    if !username.is_empty() && s.throttle.is_locked(ip, username) {
        return Ok(LoginOutcome::Locked);
    }

    let mut errors = FieldErrors::new();
    if username.is_empty() {
        push(&mut errors, "username", MSG_REQUIRED);
    }
    if form.password.is_empty() {
        push(&mut errors, "password", MSG_REQUIRED);
    }

    if errors.is_empty() {
        let user: Option<UserRow> = s.db.get_user_by_username(username)?;
        if let Some(user) = user.filter(|u| verify_password(&form.password, &u.password)) {
            s.throttle.clear(ip, username);
            info!("User {} logged in from {}", user.username, ip);
            return Ok(LoginOutcome::Success {
                user_id: user.id,
                username: user.username,
            });
        }
        push(&mut errors, NON_FIELD_ERRORS, MSG_BAD_CREDENTIALS);
    }

    if !username.is_empty() {
        s.throttle.register_failure(ip, username);
    }
    Ok(LoginOutcome::Invalid(errors))
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Query(query): Query<RedirectForm>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let next = form
        .next
        .as_deref()
        .or(query.next.as_deref())
        .and_then(local_target)
        .unwrap_or_else(|| "/cabinet/".to_string());

    let outcome = blocking(&state, move |s| attempt_login(s, &ip, &form)).await?;

    match outcome {
        LoginOutcome::Success { user_id, username } => {
            let token = create_token(&state.jwt_secret, user_id, &username, state.session_days)?;
            Ok((jar.add(session_cookie(token)), Redirect::to(&next)).into_response())
        }
        LoginOutcome::Throttled => Err(ApiError::Throttled(MSG_IP_THROTTLED.to_string())),
        LoginOutcome::Locked => Err(ApiError::Throttled(MSG_LOCKED.to_string())),
        LoginOutcome::Invalid(errors) => Ok((
            StatusCode::BAD_REQUEST,
            Json(FormErrorResponse { ok: false, errors }),
        )
            .into_response()),
    }
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/");
    (jar.remove(removal), Redirect::to("/"))
}

/// Load the caller and insist on staff rights.
pub fn require_staff(s: &AppStateInner, claims: &Claims) -> Result<UserRow, ApiError> {
    let user = s.db.get_user_by_id(claims.sub)?.ok_or(ApiError::Unauthorized)?;
    if !user.is_staff {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |s| {
        s.db.get_user_by_id(claims.sub)?.ok_or(ApiError::Unauthorized)
    })
    .await?;
    Ok(Json(serde_json::json!({
        "id": user.id,
        "username": user.username,
        "is_staff": user.is_staff,
    })))
}

#[cfg(test)]
pub(crate) mod testing {
    use argon2::{Algorithm, Params, Version};
    use chrono::TimeZone;
    use oselya_db::models::ListingFields;
    use oselya_types::models::{ListingStatus, Rooms};
    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::throttle::{MemoryCounterStore, ThrottlePolicy};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    /// Argon2 with minimal cost so tests don't spend seconds hashing.
    pub fn cheap_hash(password: &str) -> String {
        let params = Params::new(8, 1, 1, None).unwrap();
        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    pub fn state() -> (Arc<ManualClock>, AppStateInner) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryCounterStore::new(clock.clone()));
        let state = AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            session_days: 14,
            throttle: LoginThrottle::new(store, ThrottlePolicy::default()),
            clock: clock.clone(),
        };
        (clock, state)
    }

    pub fn fields(title: &str) -> ListingFields {
        ListingFields {
            title: title.into(),
            address: "Київ, вул. Хрещатик, 1".into(),
            price_per_month: Decimal::new(1_500_000, 2),
            floor: Some(3),
            total_floors: Some(9),
            heating: None,
            pets: None,
            rooms: Rooms::Two,
            area_sqm: None,
            description: String::new(),
            contact_name: "Owner".into(),
            contact_phone: String::new(),
            contact_email: String::new(),
            status: ListingStatus::Published,
        }
    }

    pub fn user(s: &AppStateInner, username: &str, password: &str) -> i64 {
        s.db.create_user(
            username,
            &format!("{username}@example.com"),
            &cheap_hash(password),
            t0(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::testing::{state, user};
    use super::*;

    fn form(username: &str, password: &str) -> LoginForm {
        LoginForm {
            username: username.into(),
            password: password.into(),
            next: None,
        }
    }

    #[test]
    fn good_credentials_succeed_and_clear_failures() {
        let (_, s) = state();
        let id = user(&s, "olena", "correct horse");

        let bad = attempt_login(&s, "1.1.1.1", &form("olena", "nope")).unwrap();
        assert!(matches!(bad, LoginOutcome::Invalid(ref e) if e.contains_key(NON_FIELD_ERRORS)));
        assert_eq!(s.throttle.failures("1.1.1.1", "olena"), 1);

        let good = attempt_login(&s, "1.1.1.1", &form(" olena ", "correct horse")).unwrap();
        assert!(matches!(good, LoginOutcome::Success { user_id, .. } if user_id == id));
        assert_eq!(s.throttle.failures("1.1.1.1", "olena"), 0);
    }

    #[test]
    fn sixth_attempt_from_one_ip_is_throttled() {
        let (_, s) = state();
        user(&s, "olena", "correct horse");
        for _ in 0..5 {
            let outcome = attempt_login(&s, "1.1.1.1", &form("olena", "nope")).unwrap();
            assert!(matches!(outcome, LoginOutcome::Invalid(_)));
        }
        let outcome = attempt_login(&s, "1.1.1.1", &form("olena", "correct horse")).unwrap();
        assert!(matches!(outcome, LoginOutcome::Throttled));
    }

    #[test]
    fn ten_failures_lock_even_correct_password_until_expiry() {
        let (clock, s) = state();
        user(&s, "olena", "correct horse");
        for _ in 0..10 {
            attempt_login(&s, "1.1.1.1", &form("olena", "nope")).unwrap();
            clock.advance(Duration::seconds(100));
        }

        let outcome = attempt_login(&s, "1.1.1.1", &form("olena", "correct horse")).unwrap();
        assert!(matches!(outcome, LoginOutcome::Locked));

        // Another address is not affected by the lock.
        let outcome = attempt_login(&s, "2.2.2.2", &form("olena", "correct horse")).unwrap();
        assert!(matches!(outcome, LoginOutcome::Success { .. }));

        clock.advance(Duration::seconds(901));
        let outcome = attempt_login(&s, "1.1.1.1", &form("olena", "correct horse")).unwrap();
        assert!(matches!(outcome, LoginOutcome::Success { .. }));
    }

    #[test]
    fn blank_fields_are_reported_without_counting_failure() {
        let (_, s) = state();
        let outcome = attempt_login(&s, "1.1.1.1", &form("", "")).unwrap();
        let LoginOutcome::Invalid(errors) = outcome else {
            panic!("expected form errors");
        };
        assert!(errors.contains_key("username"));
        assert!(errors.contains_key("password"));
    }

    #[test]
    fn signup_validates_and_rejects_duplicates() {
        let (_, s) = state();
        user(&s, "olena", "correct horse");

        let err = register_user(
            &s,
            &SignupForm {
                username: "olena".into(),
                email: "OLENA@example.com".into(),
                password: "short".into(),
                password_confirm: "other".into(),
            },
        )
        .unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        for field in ["username", "email", "password", "password_confirm"] {
            assert!(errors.contains_key(field), "missing error for {field}");
        }
    }

    #[test]
    fn account_taken_after_checks_is_a_field_error() {
        let (_, s) = state();
        user(&s, "olena", "correct horse");

        let by_name = insert_account(&s, "olena", "other@example.com", "hash").unwrap_err();
        assert!(matches!(
            by_name,
            ApiError::Validation(ref e) if e.contains_key("username") && !e.contains_key("email")
        ));

        let by_email = insert_account(&s, "taras", "olena@example.com", "hash").unwrap_err();
        assert!(matches!(
            by_email,
            ApiError::Validation(ref e) if e.contains_key("email") && !e.contains_key("username")
        ));
    }

    #[test]
    fn staff_check_uses_the_stored_flag() {
        let (_, s) = state();
        let id = user(&s, "moderator", "correct horse");
        let claims = Claims {
            sub: id,
            username: "moderator".into(),
            exp: 0,
        };
        assert!(matches!(require_staff(&s, &claims), Err(ApiError::Forbidden)));
        s.db.set_staff("moderator", true).unwrap();
        assert!(require_staff(&s, &claims).is_ok());
    }
}
