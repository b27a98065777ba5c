use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};

use oselya_types::models::ListingStatus;

use super::{OptionalExt, parse_col, parse_opt_col};
use crate::Database;
use crate::models::{ListingFields, ListingRow, ListingSearch};

pub(crate) const LISTING_COLUMNS: &str = "l.id, l.owner_id, l.title, l.address, l.price_per_month, \
     l.floor, l.total_floors, l.heating, l.pets, l.rooms, l.area_sqm, l.description, \
     l.contact_name, l.contact_phone, l.contact_email, l.status, l.views_count, l.is_active, \
     l.created_at, l.updated_at";

impl Database {
    pub fn insert_listing(
        &self,
        owner_id: Option<i64>,
        fields: &ListingFields,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO listings (owner_id, title, address, price_per_month, floor, total_floors,
                     heating, pets, rooms, area_sqm, description, contact_name, contact_phone,
                     contact_email, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
                rusqlite::params![
                    owner_id,
                    fields.title,
                    fields.address,
                    fields.price_per_month.to_string(),
                    fields.floor,
                    fields.total_floors,
                    fields.heating.map(|h| h.as_str()),
                    fields.pets.map(|p| p.as_str()),
                    fields.rooms.as_str(),
                    fields.area_sqm.map(|a| a.to_string()),
                    fields.description,
                    fields.contact_name,
                    fields.contact_phone,
                    fields.contact_email,
                    fields.status.as_str(),
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_listing(&self, id: i64, fields: &ListingFields, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE listings SET title = ?2, address = ?3, price_per_month = ?4, floor = ?5,
                     total_floors = ?6, heating = ?7, pets = ?8, rooms = ?9, area_sqm = ?10,
                     description = ?11, contact_name = ?12, contact_phone = ?13,
                     contact_email = ?14, status = ?15, updated_at = ?16
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    fields.title,
                    fields.address,
                    fields.price_per_month.to_string(),
                    fields.floor,
                    fields.total_floors,
                    fields.heating.map(|h| h.as_str()),
                    fields.pets.map(|p| p.as_str()),
                    fields.rooms.as_str(),
                    fields.area_sqm.map(|a| a.to_string()),
                    fields.description,
                    fields.contact_name,
                    fields.contact_phone,
                    fields.contact_email,
                    fields.status.as_str(),
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Delete a listing owned by `owner_id`. Returns false when nothing matched.
    pub fn delete_listing(&self, id: i64, owner_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM listings WHERE id = ?1 AND owner_id = ?2",
                [id, owner_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn get_listing(&self, id: i64) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| query_listing(conn, id))
    }

    /// Bump the view counter in place and return the new value.
    pub fn increment_views(&self, id: i64) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let views = conn.query_row(
                "UPDATE listings SET views_count = views_count + 1 WHERE id = ?1 RETURNING views_count",
                [id],
                |row| row.get(0),
            )?;
            Ok(views)
        })
    }

    /// Active, published listings matching every set filter, newest first.
    pub fn search_listings(&self, search: &ListingSearch) -> Result<Vec<ListingRow>> {
        let mut clauses = vec!["l.is_active = 1".to_string(), "l.status = 'published'".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        let mut bind = |clause: &str, value: Box<dyn ToSql>| {
            params.push(value);
            clauses.push(format!("{} ?{}", clause, params.len()));
        };

        if let Some(min) = search.min_price {
            bind("CAST(l.price_per_month AS REAL) >=", Box::new(decimal_to_f64(min)));
        }
        if let Some(max) = search.max_price {
            bind("CAST(l.price_per_month AS REAL) <=", Box::new(decimal_to_f64(max)));
        }
        if let Some(rooms) = search.rooms {
            bind("l.rooms =", Box::new(rooms.as_str()));
        }
        if let Some(floor) = search.floor {
            bind("l.floor =", Box::new(floor));
        }
        if let Some(pets) = search.pets {
            bind("l.pets =", Box::new(pets.as_str()));
        }
        if let Some(heating) = search.heating {
            bind("l.heating =", Box::new(heating.as_str()));
        }

        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings l WHERE {} ORDER BY l.created_at DESC, l.id DESC",
            clauses.join(" AND ")
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt
                .query_map(refs.as_slice(), map_listing)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every listing of an owner regardless of status, for their dashboard.
    pub fn listings_by_owner(&self, owner_id: i64) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings l WHERE l.owner_id = ?1
                 ORDER BY l.created_at DESC, l.id DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id], map_listing)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The public face of an author: active, published listings only.
    pub fn published_by_owner(&self, owner_id: i64) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings l
                 WHERE l.owner_id = ?1 AND l.is_active = 1 AND l.status = ?2
                 ORDER BY l.created_at DESC, l.id DESC"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![owner_id, ListingStatus::Published.as_str()],
                    map_listing,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// Catalog price filters compare numerically inside SQLite.
fn decimal_to_f64(value: rust_decimal::Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

pub(crate) fn query_listing(conn: &Connection, id: i64) -> Result<Option<ListingRow>> {
    conn.query_row(
        &format!("SELECT {LISTING_COLUMNS} FROM listings l WHERE l.id = ?1"),
        [id],
        map_listing,
    )
    .optional()
}

/// Maps [`LISTING_COLUMNS`] starting at column `0`.
pub(crate) fn map_listing(row: &Row<'_>) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        fields: ListingFields {
            title: row.get(2)?,
            address: row.get(3)?,
            price_per_month: parse_col(row, 4)?,
            floor: row.get(5)?,
            total_floors: row.get(6)?,
            heating: parse_opt_col(row, 7)?,
            pets: parse_opt_col(row, 8)?,
            rooms: parse_col(row, 9)?,
            area_sqm: parse_opt_col(row, 10)?,
            description: row.get(11)?,
            contact_name: row.get(12)?,
            contact_phone: row.get(13)?,
            contact_email: row.get(14)?,
            status: parse_col(row, 15)?,
        },
        views_count: row.get(16)?,
        is_active: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}
