use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    Extension, Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use oselya_db::models::{ListingFields, ListingRow, ListingSearch};
use oselya_types::api::{
    ActiveFilter, AuthorListingsResponse, CatalogResponse, DashboardResponse, FieldErrors,
    ListingDetailResponse, ListingForm, ListingView,
};
use oselya_types::models::{Heating, ListingStatus, Pets, Rooms};

use crate::auth::{AppState, AppStateInner, blocking};
use crate::chat::message_view;
use crate::error::ApiError;
use crate::middleware::{Claims, Viewer};
use crate::negotiate::{Negotiated, RequestMode};
use crate::presence::{last_seen_human, user_summary};

pub fn listing_view(row: &ListingRow) -> ListingView {
    let f = &row.fields;
    ListingView {
        id: row.id,
        owner_id: row.owner_id,
        title: f.title.clone(),
        address: f.address.clone(),
        price_per_month: f.price_per_month,
        floor: f.floor,
        total_floors: f.total_floors,
        heating: f.heating,
        pets: f.pets,
        rooms: f.rooms,
        area_sqm: f.area_sqm,
        description: f.description.clone(),
        contact_name: f.contact_name.clone(),
        contact_phone: f.contact_phone.clone(),
        contact_email: f.contact_email.clone(),
        status: f.status,
        views_count: row.views_count,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

// -- Catalog filters --

/// Filter names in the order they appear in generated query strings.
pub const FILTER_KEYS: [&str; 6] = ["min_price", "max_price", "rooms", "floor", "pets", "heating"];

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub rooms: Option<String>,
    pub floor: Option<String>,
    pub pets: Option<String>,
    pub heating: Option<String>,
}

/// Catalog filters that were both present and understood, in key order.
#[derive(Debug, Default)]
pub struct FilterState {
    values: Vec<(&'static str, String)>,
    search: ListingSearch,
}

fn parse_filter<T: FromStr>(raw: &Option<String>) -> Option<(T, String)> {
    let raw = raw.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse().ok().map(|v| (v, raw.to_string()))
}

impl FilterState {
    pub fn parse(query: &CatalogQuery) -> Self {
        let mut state = Self::default();

        if let Some((v, raw)) = parse_filter::<Decimal>(&query.min_price) {
            state.search.min_price = Some(v);
            state.values.push(("min_price", raw));
        }
        if let Some((v, raw)) = parse_filter::<Decimal>(&query.max_price) {
            state.search.max_price = Some(v);
            state.values.push(("max_price", raw));
        }
        if let Some((v, raw)) = parse_filter::<Rooms>(&query.rooms) {
            state.search.rooms = Some(v);
            state.values.push(("rooms", raw));
        }
        if let Some((v, raw)) = parse_filter::<i64>(&query.floor) {
            state.search.floor = Some(v);
            state.values.push(("floor", raw));
        }
        if let Some((v, raw)) = parse_filter::<Pets>(&query.pets) {
            state.search.pets = Some(v);
            state.values.push(("pets", raw));
        }
        if let Some((v, raw)) = parse_filter::<Heating>(&query.heating) {
            state.search.heating = Some(v);
            state.values.push(("heating", raw));
        }
        state
    }

    pub fn search(&self) -> &ListingSearch {
        &self.search
    }

    /// Encoded query string of every active filter except `key`.
    pub fn query_without(&self, key: &str) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.values.iter().filter(|(name, _)| *name != key) {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }

    /// All filter names, with an empty string for unset ones.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        FILTER_KEYS
            .iter()
            .map(|key| {
                let value = self
                    .values
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                (key.to_string(), value)
            })
            .collect()
    }

    pub fn active(&self) -> Vec<ActiveFilter> {
        self.values
            .iter()
            .map(|(name, value)| ActiveFilter {
                name: name.to_string(),
                value: value.clone(),
                label: self.label(name).unwrap_or_else(|| value.clone()),
                query_without: self.query_without(name),
            })
            .collect()
    }

    fn label(&self, name: &str) -> Option<String> {
        match name {
            "rooms" => self.search.rooms.map(|v| v.label().to_string()),
            "pets" => self.search.pets.map(|v| v.label().to_string()),
            "heating" => self.search.heating.map(|v| v.label().to_string()),
            _ => None,
        }
    }
}

pub fn catalog(
    s: &AppStateInner,
    viewer: Option<i64>,
    query: &CatalogQuery,
) -> Result<CatalogResponse, ApiError> {
    let filters = FilterState::parse(query);
    let rows = s.db.search_listings(filters.search())?;
    let favorite_ids = match viewer {
        Some(user_id) => s.db.favorite_ids(user_id)?,
        None => Vec::new(),
    };

    Ok(CatalogResponse {
        listings: rows.iter().map(listing_view).collect(),
        filters: filters.as_map(),
        active_filters: filters.active(),
        favorite_ids,
    })
}

// -- Detail and author pages --

/// Public listing page. Every view bumps the counter, the owner's included.
pub fn detail(
    s: &AppStateInner,
    listing_id: i64,
    viewer: Option<i64>,
    modal_open: bool,
) -> Result<ListingDetailResponse, ApiError> {
    let mut listing = s
        .db
        .get_listing(listing_id)?
        .filter(|l| l.is_active)
        .ok_or(ApiError::NotFound)?;
    listing.views_count = s.db.increment_views(listing.id)?;

    let owner = match listing.owner_id {
        Some(owner_id) => s.db.get_user_ref(owner_id)?,
        None => None,
    };
    let owner_last_seen = owner.as_ref().and_then(|o| o.last_seen_at);

    let mut is_favorite = false;
    let mut thread_id = None;
    let mut thread_messages = Vec::new();
    if let Some(viewer_id) = viewer {
        is_favorite = s.db.is_favorite(viewer_id, listing.id)?;
        if let Some(owner_id) = listing.owner_id.filter(|o| *o != viewer_id) {
            thread_id = s.db.find_thread(listing.id, owner_id, viewer_id)?;
            if let Some(id) = thread_id {
                thread_messages = s
                    .db
                    .messages_after(id, 0)?
                    .iter()
                    .map(|m| message_view(m, viewer_id))
                    .collect();
            }
        }
    }

    Ok(ListingDetailResponse {
        listing: listing_view(&listing),
        owner: owner.as_ref().map(user_summary),
        owner_last_seen,
        owner_last_seen_human: last_seen_human(owner_last_seen, s.now()),
        is_favorite,
        thread_id,
        thread_messages,
        modal_open,
    })
}

pub fn author(s: &AppStateInner, user_id: i64) -> Result<AuthorListingsResponse, ApiError> {
    let author = s.db.get_user_ref(user_id)?.ok_or(ApiError::NotFound)?;
    let rows = s.db.published_by_owner(user_id)?;
    Ok(AuthorListingsResponse {
        author: user_summary(&author),
        listings: rows.iter().map(listing_view).collect(),
    })
}

// -- Owner dashboard --

const TITLE_MAX: usize = 120;
const ADDRESS_MAX: usize = 255;
const CONTACT_NAME_MAX: usize = 120;
const CONTACT_PHONE_MAX: usize = 50;
const FLOOR_MAX: i64 = 32_767;

const MSG_REQUIRED: &str = "Обов'язкове поле.";
const MSG_BAD_CHOICE: &str = "Оберіть коректний варіант.";
const MSG_FLOOR_ABOVE_TOTAL: &str = "Поверх не може бути більшим за загальну кількість поверхів.";
const MSG_BLOCKED_LOCKED: &str =
    "Це оголошення заблоковане модератором і не може бути розблоковане з кабінету.";

struct FormCheck {
    errors: FieldErrors,
}

impl FormCheck {
    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    fn text(&mut self, field: &str, raw: &str, required: bool, max: usize) -> String {
        let value = raw.trim();
        if required && value.is_empty() {
            self.error(field, MSG_REQUIRED);
        } else if value.chars().count() > max {
            self.error(field, format!("Не більше {max} символів."));
        }
        value.to_string()
    }

    fn choice<T: FromStr>(&mut self, field: &str, raw: &str) -> Option<T> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        let parsed = value.parse().ok();
        if parsed.is_none() {
            self.error(field, MSG_BAD_CHOICE);
        }
        parsed
    }

    fn floor(&mut self, field: &str, raw: &str) -> Option<i64> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        match value.parse::<i64>() {
            Ok(n) if (0..=FLOOR_MAX).contains(&n) => Some(n),
            _ => {
                self.error(field, format!("Ціле число від 0 до {FLOOR_MAX}."));
                None
            }
        }
    }

    /// Non-negative decimal with at most two fractional digits and
    /// `max_digits` digits overall.
    fn decimal(&mut self, field: &str, raw: &str, max_digits: u32) -> Option<Decimal> {
        let value = raw.trim().replace(',', ".");
        if value.is_empty() {
            return None;
        }
        let parsed = Decimal::from_str(&value).ok().filter(|d| {
            let d = d.normalize();
            let integer_digits = d.trunc().abs().to_string().trim_start_matches('0').len() as u32;
            !d.is_sign_negative() && d.scale() <= 2 && integer_digits <= max_digits - 2
        });
        if parsed.is_none() {
            self.error(field, "Введіть коректне невід'ємне число (до 2 знаків після коми).");
        }
        parsed.map(|d| d.round_dp(2))
    }
}

/// Validate an owner's listing form.
///
/// `existing` is the stored status when editing. Owners may never set
/// `blocked` themselves, and a blocked listing must stay blocked.
pub fn validate_listing(
    form: &ListingForm,
    existing: Option<ListingStatus>,
) -> Result<ListingFields, ApiError> {
    let mut check = FormCheck {
        errors: FieldErrors::new(),
    };

    let title = check.text("title", &form.title, true, TITLE_MAX);
    let address = check.text("address", &form.address, true, ADDRESS_MAX);
    let price = check.decimal("price_per_month", &form.price_per_month, 10);
    if price.is_none() && form.price_per_month.trim().is_empty() {
        check.error("price_per_month", MSG_REQUIRED);
    }
    let floor = check.floor("floor", &form.floor);
    let total_floors = check.floor("total_floors", &form.total_floors);
    let heating = check.choice::<Heating>("heating", &form.heating);
    let pets = check.choice::<Pets>("pets", &form.pets);
    let rooms = check.choice::<Rooms>("rooms", &form.rooms);
    if rooms.is_none() && form.rooms.trim().is_empty() {
        check.error("rooms", MSG_REQUIRED);
    }
    let area_sqm = check.decimal("area_sqm", &form.area_sqm, 7);
    let description = form.description.trim().to_string();
    let contact_name = check.text("contact_name", &form.contact_name, true, CONTACT_NAME_MAX);
    let contact_phone = check.text("contact_phone", &form.contact_phone, false, CONTACT_PHONE_MAX);
    let contact_email = form.contact_email.trim().to_string();
    if !contact_email.is_empty() {
        let valid = contact_email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            check.error("contact_email", "Введіть коректну адресу електронної пошти.");
        }
    }

    if let (Some(f), Some(total)) = (floor, total_floors) {
        if f > 0 && total > 0 && f > total {
            check.error("floor", MSG_FLOOR_ABOVE_TOTAL);
        }
    }

    let status = if form.status.trim().is_empty() {
        Some(existing.unwrap_or_default())
    } else {
        check.choice::<ListingStatus>("status", &form.status)
    };
    let was_blocked = existing == Some(ListingStatus::Blocked);
    match status {
        Some(ListingStatus::Blocked) if !was_blocked => check.error("status", MSG_BAD_CHOICE),
        Some(s) if was_blocked && s != ListingStatus::Blocked => {
            check.error("status", MSG_BLOCKED_LOCKED)
        }
        _ => {}
    }

    match (check.errors.is_empty(), price, rooms, status) {
        (true, Some(price_per_month), Some(rooms), Some(status)) => Ok(ListingFields {
            title,
            address,
            price_per_month,
            floor,
            total_floors,
            heating,
            pets,
            rooms,
            area_sqm,
            description,
            contact_name,
            contact_phone,
            contact_email,
            status,
        }),
        _ => Err(ApiError::Validation(check.errors)),
    }
}

pub fn dashboard(s: &AppStateInner, owner_id: i64) -> Result<DashboardResponse, ApiError> {
    let rows = s.db.listings_by_owner(owner_id)?;
    Ok(DashboardResponse {
        total_views: rows.iter().map(|r| r.views_count).sum(),
        listings: rows.iter().map(listing_view).collect(),
    })
}

/// A listing the caller owns; anybody else's reads as missing.
pub fn owned_listing(s: &AppStateInner, owner_id: i64, listing_id: i64) -> Result<ListingRow, ApiError> {
    s.db.get_listing(listing_id)?
        .filter(|l| l.owner_id == Some(owner_id))
        .ok_or(ApiError::NotFound)
}

pub fn create_listing(s: &AppStateInner, owner_id: i64, form: &ListingForm) -> Result<i64, ApiError> {
    let fields = validate_listing(form, None)?;
    let id = s.db.insert_listing(Some(owner_id), &fields, s.now())?;
    info!("User {} created listing {}", owner_id, id);
    Ok(id)
}

pub fn update_listing(
    s: &AppStateInner,
    owner_id: i64,
    listing_id: i64,
    form: &ListingForm,
) -> Result<(), ApiError> {
    let current = owned_listing(s, owner_id, listing_id)?;
    let fields = validate_listing(form, Some(current.fields.status))?;
    s.db.update_listing(current.id, &fields, s.now())?;
    info!("User {} updated listing {}", owner_id, listing_id);
    Ok(())
}

pub fn delete_listing(s: &AppStateInner, owner_id: i64, listing_id: i64) -> Result<(), ApiError> {
    if !s.db.delete_listing(listing_id, owner_id)? {
        return Err(ApiError::NotFound);
    }
    info!("User {} deleted listing {}", owner_id, listing_id);
    Ok(())
}

// -- Handlers --

pub async fn catalog_page(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer_id = viewer.user_id();
    let page = blocking(&state, move |s| catalog(s, viewer_id, &query)).await?;
    Ok(Json(page))
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    pub open_message: Option<String>,
}

pub async fn detail_page(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(listing_id): Path<i64>,
    Query(query): Query<DetailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer_id = viewer.user_id();
    let modal_open = query.open_message.as_deref() == Some("1");
    let page = blocking(&state, move |s| detail(s, listing_id, viewer_id, modal_open)).await?;
    Ok(Json(page))
}

pub async fn author_page(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(&state, move |s| author(s, user_id)).await?;
    Ok(Json(page))
}

pub async fn dashboard_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(&state, move |s| dashboard(s, claims.sub)).await?;
    Ok(Json(page))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mode: RequestMode,
    Form(form): Form<ListingForm>,
) -> Result<Response, ApiError> {
    let id = blocking(&state, move |s| create_listing(s, claims.sub, &form)).await?;
    Ok(Negotiated::ok(StatusCode::CREATED, json!({ "ok": true, "id": id }), "/cabinet/").respond(mode))
}

pub async fn edit_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(listing_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |s| owned_listing(s, claims.sub, listing_id)).await?;
    Ok(Json(listing_view(&row)))
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(listing_id): Path<i64>,
    mode: RequestMode,
    Form(form): Form<ListingForm>,
) -> Result<Response, ApiError> {
    blocking(&state, move |s| update_listing(s, claims.sub, listing_id, &form)).await?;
    Ok(Negotiated::ok(StatusCode::OK, json!({ "ok": true, "id": listing_id }), "/cabinet/").respond(mode))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(listing_id): Path<i64>,
    mode: RequestMode,
) -> Result<Response, ApiError> {
    blocking(&state, move |s| delete_listing(s, claims.sub, listing_id)).await?;
    Ok(Negotiated::ok(StatusCode::OK, json!({ "ok": true }), "/cabinet/").respond(mode))
}
