use axum::{
    Extension, Form,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde_json::json;
use tracing::info;

use oselya_types::api::ReportForm;
use oselya_types::models::ReportReason;

use crate::auth::{AppState, AppStateInner, blocking};
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::negotiate::{Negotiated, RequestMode};

const DESCRIPTION_MAX_CHARS: usize = 5000;

#[derive(Debug)]
pub enum ReportOutcome {
    Filed(i64),
    OwnListing,
}

/// File a complaint about an active listing. Owners cannot report their own.
pub fn submit_report(
    s: &AppStateInner,
    listing_id: i64,
    reporter_id: i64,
    form: &ReportForm,
) -> Result<ReportOutcome, ApiError> {
    let listing = s
        .db
        .get_listing(listing_id)?
        .filter(|l| l.is_active)
        .ok_or(ApiError::NotFound)?;
    if listing.owner_id == Some(reporter_id) {
        return Ok(ReportOutcome::OwnListing);
    }

    let reason: ReportReason = form
        .reason
        .trim()
        .parse()
        .map_err(|_| ApiError::field("reason", "Оберіть тему скарги зі списку."))?;
    let description = form.description.trim();
    if description.is_empty() {
        return Err(ApiError::field("description", "Обов'язкове поле."));
    }
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(ApiError::field(
            "description",
            format!("Не більше {DESCRIPTION_MAX_CHARS} символів."),
        ));
    }

    let report_id = s
        .db
        .insert_report(listing.id, reporter_id, reason, description, s.now())?;
    info!(
        "User {} reported listing {} ({}), report {}",
        reporter_id, listing.id, reason, report_id
    );
    Ok(ReportOutcome::Filed(report_id))
}

pub async fn report_listing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(listing_id): Path<i64>,
    mode: RequestMode,
    Form(form): Form<ReportForm>,
) -> Result<Response, ApiError> {
    let reporter_id = claims.sub;
    let outcome = blocking(&state, move |s| {
        submit_report(s, listing_id, reporter_id, &form)
    })
    .await?;

    let listing_page = format!("/listing/{listing_id}/");
    let negotiated = match outcome {
        ReportOutcome::Filed(report_id) => Negotiated::ok(
            StatusCode::CREATED,
            json!({ "ok": true, "report_id": report_id }),
            listing_page,
        ),
        ReportOutcome::OwnListing => {
            Negotiated::refused(StatusCode::FORBIDDEN, "own_listing", listing_page)
        }
    };
    Ok(negotiated.respond(mode))
}

#[cfg(test)]
mod tests {
    use oselya_types::models::ModerationStatus;

    use super::*;
    use crate::auth::testing::{fields, state, t0, user};

    fn form(reason: &str) -> ReportForm {
        ReportForm {
            reason: reason.into(),
            description: "  Фото не відповідають  ".into(),
        }
    }

    #[test]
    fn report_starts_pending() {
        let (_, s) = state();
        let owner = user(&s, "owner", "pw-owner-1");
        let reporter = user(&s, "reporter", "pw-reporter");
        let flat = s.db.insert_listing(Some(owner), &fields("Flat"), t0()).unwrap();

        let ReportOutcome::Filed(id) = submit_report(&s, flat, reporter, &form("false_info")).unwrap()
        else {
            panic!("expected a filed report");
        };
        let report = s.db.get_report(id).unwrap().unwrap();
        assert_eq!(report.moderation_status, ModerationStatus::Pending);
        assert_eq!(report.reason, ReportReason::FalseInfo);
        assert_eq!(report.description, "Фото не відповідають");
        assert_eq!(report.reviewed_by, None);
    }

    #[test]
    fn owners_and_bad_reasons_are_refused() {
        let (_, s) = state();
        let owner = user(&s, "owner", "pw-owner-1");
        let reporter = user(&s, "reporter", "pw-reporter");
        let flat = s.db.insert_listing(Some(owner), &fields("Flat"), t0()).unwrap();

        assert!(matches!(
            submit_report(&s, flat, owner, &form("spam")).unwrap(),
            ReportOutcome::OwnListing
        ));
        assert!(matches!(
            submit_report(&s, flat, reporter, &form("boring")),
            Err(ApiError::Validation(_))
        ));
        assert!(s.db.list_reports().unwrap().is_empty());
    }

    #[test]
    fn blank_description_is_required() {
        let (_, s) = state();
        let owner = user(&s, "owner", "pw-owner-1");
        let reporter = user(&s, "reporter", "pw-reporter");
        let flat = s.db.insert_listing(Some(owner), &fields("Flat"), t0()).unwrap();

        let blank = ReportForm {
            reason: "spam".into(),
            description: "   ".into(),
        };
        assert!(matches!(
            submit_report(&s, flat, reporter, &blank),
            Err(ApiError::Validation(ref e)) if e.contains_key("description")
        ));
        assert!(s.db.list_reports().unwrap().is_empty());
    }
}
