//! Database row types. These map directly to SQLite rows and stay
//! independent of the wire types in oselya-types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use oselya_types::models::{
    Heating, ListingStatus, ModerationStatus, NotificationType, Pets, ReportReason, Rooms,
};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

pub struct ProfileRow {
    pub user_id: i64,
    pub full_name: String,
    pub phone: String,
    pub avatar: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// A user as another party sees them: name plus presence.
#[derive(Debug, Clone)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub fields: ListingFields,
    pub views_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The owner-editable part of a listing.
#[derive(Debug, Clone)]
pub struct ListingFields {
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
}

/// Conjunctive catalog filters; `None` means "don't filter on this".
#[derive(Debug, Default, Clone)]
pub struct ListingSearch {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub rooms: Option<Rooms>,
    pub floor: Option<i64>,
    pub pets: Option<Pets>,
    pub heating: Option<Heating>,
}

pub struct FavoriteRow {
    pub listing: ListingRow,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub id: i64,
    pub listing_id: i64,
    pub listing_title: String,
    pub landlord: UserRef,
    pub tenant: UserRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadRow {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.landlord.id == user_id || self.tenant.id == user_id
    }

    /// The other party relative to `user_id`.
    pub fn counterparty(&self, user_id: i64) -> &UserRef {
        if user_id == self.landlord.id {
            &self.tenant
        } else {
            &self.landlord
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessageRow {
    pub id: i64,
    pub thread_id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: i64,
    pub listing_id: i64,
    pub listing_title: String,
    pub listing_owner_id: Option<i64>,
    pub listing_status: ListingStatus,
    pub reporter_id: i64,
    pub reason: ReportReason,
    pub description: String,
    pub moderation_status: ModerationStatus,
    pub moderation_reason: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Review fields written when a moderator saves a report.
pub struct ReviewUpdate {
    pub status: ModerationStatus,
    pub moderation_reason: String,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub recipient_id: Option<i64>,
    pub related_report_id: Option<i64>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Option<i64>,
    pub related_report_id: Option<i64>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
}
