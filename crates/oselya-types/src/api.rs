use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{
    Heating, ListingStatus, ModerationStatus, NotificationType, Pets, ReportReason, Rooms,
};

/// Key under which errors that belong to no single field are reported.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Field name -> messages, as shown next to form inputs.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Serialize)]
pub struct FormErrorResponse {
    pub ok: bool,
    pub errors: FieldErrors,
}

// -- Accounts --

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: String,
    pub avatar: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
}

// -- Chat --

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageForm {
    #[serde(default)]
    pub message_text: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// A chat message as the browser widget renders it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessageView {
    pub id: i64,
    pub text: String,
    /// `DD.MM.YYYY HH:MM`
    pub created_at: String,
    pub is_me: bool,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    pub message: ChatMessageView,
}

#[derive(Debug, Serialize)]
pub struct ChatErrorResponse {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    pub after_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub ok: bool,
    pub messages: Vec<ChatMessageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub id: i64,
    pub listing_id: i64,
    pub listing_title: String,
    pub landlord: UserSummary,
    pub tenant: UserSummary,
    pub counterparty: UserSummary,
    pub counterparty_last_seen: Option<DateTime<Utc>>,
    pub counterparty_last_seen_human: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub active_tab: String,
    pub current_threads: Vec<ThreadSummary>,
    pub incoming_threads: Vec<ThreadSummary>,
    pub outgoing_threads: Vec<ThreadSummary>,
    pub unread_threads: Vec<ThreadSummary>,
}

#[derive(Debug, Serialize)]
pub struct ThreadPage {
    pub thread_id: i64,
    pub listing_id: i64,
    pub listing_title: String,
    pub other_user: UserSummary,
    pub other_last_seen: Option<DateTime<Utc>>,
    pub other_last_seen_human: String,
    pub messages: Vec<ChatMessageView>,
}

// -- Listings --

#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub title: String,
    pub address: String,
    pub price_per_month: Decimal,
    pub floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub heating: Option<Heating>,
    pub pets: Option<Pets>,
    pub rooms: Rooms,
    pub area_sqm: Option<Decimal>,
    pub description: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub status: ListingStatus,
    pub views_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing create/edit form. Every field arrives as text so that bad input
/// can be reported per field instead of failing deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct ListingForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub price_per_month: String,
    #[serde(default)]
    pub floor: String,
    #[serde(default)]
    pub total_floors: String,
    #[serde(default)]
    pub heating: String,
    #[serde(default)]
    pub pets: String,
    #[serde(default)]
    pub rooms: String,
    #[serde(default)]
    pub area_sqm: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveFilter {
    pub name: String,
    pub value: String,
    pub label: String,
    /// Query string of every other active filter, for a "remove" link.
    pub query_without: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub listings: Vec<ListingView>,
    pub filters: BTreeMap<String, String>,
    pub active_filters: Vec<ActiveFilter>,
    pub favorite_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListingDetailResponse {
    pub listing: ListingView,
    pub owner: Option<UserSummary>,
    pub owner_last_seen: Option<DateTime<Utc>>,
    pub owner_last_seen_human: String,
    pub is_favorite: bool,
    pub thread_id: Option<i64>,
    pub thread_messages: Vec<ChatMessageView>,
    pub modal_open: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthorListingsResponse {
    pub author: UserSummary,
    pub listings: Vec<ListingView>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub listings: Vec<ListingView>,
    pub total_views: i64,
}

// -- Favorites --

#[derive(Debug, Default, Deserialize)]
pub struct RedirectForm {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FavoriteView {
    pub listing: ListingView,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BadgesResponse {
    pub favorites_count: i64,
    pub unread_messages_count: i64,
}

// -- Reports and moderation --

#[derive(Debug, Default, Deserialize)]
pub struct ReportForm {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub id: i64,
    pub listing_id: i64,
    pub listing_title: String,
    pub reporter_id: i64,
    pub reason: ReportReason,
    pub description: String,
    pub moderation_status: ModerationStatus,
    pub moderation_reason: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub status: ModerationStatus,
    #[serde(default)]
    pub moderation_reason: String,
}

#[derive(Debug, Serialize)]
pub struct ModerationResponse {
    pub report: ReportView,
    pub listing_blocked: bool,
    pub notifications_sent: usize,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationView {
    pub id: i64,
    pub notification_type: NotificationType,
    pub type_label: String,
    pub title: String,
    pub message: String,
    pub related_report_id: Option<i64>,
    pub is_broadcast: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: Option<i64>,
    #[serde(default)]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
}
