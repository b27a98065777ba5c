//! Report moderation: status transitions and the side effects they trigger.
//!
//! Saving a report with a new moderation status fans out into listing
//! blocks and notifications. Which effects fire depends only on the status
//! the report moves to, and nothing fires when the status is unchanged.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::{debug, info};

use oselya_db::models::{NewNotification, ReportRow, ReviewUpdate};
use oselya_types::api::{ModerateRequest, ModerationResponse, ReportView};
use oselya_types::models::{ListingStatus, ModerationStatus, NotificationType};

use crate::auth::{AppState, AppStateInner, blocking, require_staff};
use crate::error::ApiError;
use crate::middleware::Claims;

/// Concurrent saves a single decision will re-plan around before giving up.
const REVIEW_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    ReturnedToPending,
    InReview,
    Rejected,
    Approved,
}

impl Transition {
    pub fn between(previous: ModerationStatus, next: ModerationStatus) -> Self {
        if previous == next {
            return Self::Unchanged;
        }
        match next {
            ModerationStatus::Pending => Self::ReturnedToPending,
            ModerationStatus::InReview => Self::InReview,
            ModerationStatus::Rejected => Self::Rejected,
            ModerationStatus::Approved => Self::Approved,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    pub block_listing: Option<i64>,
    pub notifications: Vec<NewNotification>,
}

pub fn plan_effects(transition: Transition, report: &ReportRow, reason: &str) -> Effects {
    match transition {
        Transition::Unchanged | Transition::ReturnedToPending => Effects::default(),
        Transition::InReview => in_review(report),
        Transition::Rejected => rejected(report, reason),
        Transition::Approved => approved(report, reason),
    }
}

fn to_reporter(report: &ReportRow, title: &str, message: String) -> NewNotification {
    NewNotification {
        recipient_id: Some(report.reporter_id),
        related_report_id: Some(report.id),
        notification_type: NotificationType::ReportResult,
        title: title.to_string(),
        message,
    }
}

fn in_review(report: &ReportRow) -> Effects {
    Effects {
        block_listing: None,
        notifications: vec![to_reporter(
            report,
            "Скарга на розгляді",
            format!(
                "Вашу скаргу щодо оголошення '{}' прийнято в роботу.",
                report.listing_title
            ),
        )],
    }
}

fn rejected(report: &ReportRow, reason: &str) -> Effects {
    Effects {
        block_listing: None,
        notifications: vec![to_reporter(
            report,
            "Скаргу відхилено",
            format!(
                "Скаргу щодо оголошення '{}' відхилено.\nПричина: {}",
                report.listing_title, reason
            ),
        )],
    }
}

fn approved(report: &ReportRow, reason: &str) -> Effects {
    let mut notifications = vec![to_reporter(
        report,
        "Скаргу підтверджено",
        format!(
            "Скаргу щодо оголошення '{}' підтверджено. Оголошення заблоковано.",
            report.listing_title
        ),
    )];

    if let Some(owner_id) = report.listing_owner_id {
        let mut message = format!(
            "Ваше оголошення '{}' заблоковано за результатами розгляду скарги.",
            report.listing_title
        );
        if !reason.is_empty() {
            message.push_str(&format!("\nПричина: {reason}"));
        }
        notifications.push(NewNotification {
            recipient_id: Some(owner_id),
            related_report_id: Some(report.id),
            notification_type: NotificationType::ReportResult,
            title: "Оголошення заблоковано".to_string(),
            message,
        });
    }

    Effects {
        block_listing: (report.listing_status != ListingStatus::Blocked).then_some(report.listing_id),
        notifications,
    }
}

pub fn report_view(report: &ReportRow) -> ReportView {
    ReportView {
        id: report.id,
        listing_id: report.listing_id,
        listing_title: report.listing_title.clone(),
        reporter_id: report.reporter_id,
        reason: report.reason,
        description: report.description.clone(),
        moderation_status: report.moderation_status,
        moderation_reason: report.moderation_reason.clone(),
        reviewed_at: report.reviewed_at,
        reviewed_by: report.reviewed_by,
        created_at: report.created_at,
    }
}

/// Save a moderator's decision on a report and apply its side effects.
pub fn moderate(
    s: &AppStateInner,
    report_id: i64,
    request: &ModerateRequest,
    reviewer_id: i64,
) -> Result<ModerationResponse, ApiError> {
    let reason = request.moderation_reason.trim();
    if request.status == ModerationStatus::Rejected && reason.is_empty() {
        return Err(ApiError::field(
            "moderation_reason",
            "Вкажіть причину відхилення скарги.",
        ));
    }

    let now = s.now();
    let reviewed = request.status != ModerationStatus::Pending;
    let review = ReviewUpdate {
        status: request.status,
        moderation_reason: reason.to_string(),
        reviewed_by: reviewed.then_some(reviewer_id),
        reviewed_at: reviewed.then_some(now),
    };

    // Effects are planned against the status we read; if another moderator
    // saves first the update is refused and we plan again from theirs.
    for _ in 0..REVIEW_ATTEMPTS {
        let report = s.db.get_report(report_id)?.ok_or(ApiError::NotFound)?;
        let transition = Transition::between(report.moderation_status, request.status);
        let effects = plan_effects(transition, &report, reason);
        let applied = s.db.apply_review(
            report.id,
            report.moderation_status,
            &review,
            effects.block_listing,
            &effects.notifications,
            now,
        )?;
        if !applied {
            debug!("Report {} changed while being reviewed, retrying", report.id);
            continue;
        }

        info!(
            "Report {} moved {} -> {} by {} ({} notifications{})",
            report.id,
            report.moderation_status,
            request.status,
            reviewer_id,
            effects.notifications.len(),
            if effects.block_listing.is_some() { ", listing blocked" } else { "" }
        );

        let saved = s.db.get_report(report.id)?.ok_or(ApiError::NotFound)?;
        return Ok(ModerationResponse {
            report: report_view(&saved),
            listing_blocked: effects.block_listing.is_some(),
            notifications_sent: effects.notifications.len(),
        });
    }

    Err(ApiError::Internal(anyhow::anyhow!(
        "report {report_id} kept changing during review"
    )))
}

// -- Staff handlers --

pub async fn list_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = blocking(&state, move |s| {
        require_staff(s, &claims)?;
        Ok(s.db.list_reports()?)
    })
    .await?;
    Ok(Json(reports.iter().map(report_view).collect::<Vec<_>>()))
}

pub async fn moderate_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<i64>,
    Json(request): Json<ModerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(&state, move |s| {
        let staff = require_staff(s, &claims)?;
        moderate(s, report_id, &request, staff.id)
    })
    .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use oselya_types::models::ReportReason;

    use super::*;
    use crate::auth::testing::{fields, state, t0, user};

    struct World {
        s: AppStateInner,
        owner: i64,
        reporter: i64,
        moderator: i64,
        listing: i64,
        report: i64,
    }

    fn world() -> World {
        let (_, s) = state();
        let owner = user(&s, "owner", "pw-owner-1");
        let reporter = user(&s, "reporter", "pw-reporter");
        let moderator = user(&s, "moderator", "pw-moderator");
        let listing = s.db.insert_listing(Some(owner), &fields("Flat"), t0()).unwrap();
        let report = s
            .db
            .insert_report(listing, reporter, ReportReason::Fraud, "", t0())
            .unwrap();
        World { s, owner, reporter, moderator, listing, report }
    }

    fn request(status: ModerationStatus, reason: &str) -> ModerateRequest {
        ModerateRequest {
            status,
            moderation_reason: reason.to_string(),
        }
    }

    #[test]
    fn transitions_only_fire_on_change() {
        use ModerationStatus::*;
        assert_eq!(Transition::between(Approved, Approved), Transition::Unchanged);
        assert_eq!(Transition::between(Approved, Pending), Transition::ReturnedToPending);
        assert_eq!(Transition::between(Pending, InReview), Transition::InReview);
        assert_eq!(Transition::between(InReview, Rejected), Transition::Rejected);
        assert_eq!(Transition::between(Rejected, Approved), Transition::Approved);
    }

    #[test]
    fn approval_blocks_listing_and_notifies_both_parties() {
        let w = world();
        let response = moderate(&w.s, w.report, &request(ModerationStatus::Approved, ""), w.moderator)
            .unwrap();
        assert!(response.listing_blocked);
        assert_eq!(response.notifications_sent, 2);
        assert_eq!(response.report.reviewed_by, Some(w.moderator));
        assert_eq!(response.report.reviewed_at, Some(t0()));

        let listing = w.s.db.get_listing(w.listing).unwrap().unwrap();
        assert_eq!(listing.fields.status, ListingStatus::Blocked);

        let to_reporter = w.s.db.notifications_for(w.reporter).unwrap();
        assert_eq!(to_reporter.len(), 1);
        assert_eq!(to_reporter[0].title, "Скаргу підтверджено");
        let to_owner = w.s.db.notifications_for(w.owner).unwrap();
        assert_eq!(to_owner[0].title, "Оголошення заблоковано");
        assert!(!to_owner[0].message.contains("Причина"));
    }

    #[test]
    fn saving_the_same_status_again_is_silent() {
        let w = world();
        moderate(&w.s, w.report, &request(ModerationStatus::Approved, ""), w.moderator).unwrap();
        let again =
            moderate(&w.s, w.report, &request(ModerationStatus::Approved, "x"), w.moderator)
                .unwrap();
        assert_eq!(again.notifications_sent, 0);
        assert!(!again.listing_blocked);
        assert_eq!(w.s.db.notifications_for_report(w.report).unwrap().len(), 2);
    }

    #[test]
    fn simultaneous_approvals_notify_once() {
        let w = world();
        let sent: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        moderate(&w.s, w.report, &request(ModerationStatus::Approved, ""), w.moderator)
                            .unwrap()
                            .notifications_sent
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sent.iter().sum::<usize>(), 2);
        assert_eq!(sent.iter().filter(|n| **n > 0).count(), 1);
        assert_eq!(w.s.db.notifications_for_report(w.report).unwrap().len(), 2);
    }

    #[test]
    fn approving_an_already_blocked_listing_does_not_reblock() {
        let w = world();
        let second = w
            .s
            .db
            .insert_report(w.listing, w.reporter, ReportReason::Spam, "", t0())
            .unwrap();
        moderate(&w.s, w.report, &request(ModerationStatus::Approved, ""), w.moderator).unwrap();

        let response =
            moderate(&w.s, second, &request(ModerationStatus::Approved, "дубль"), w.moderator)
                .unwrap();
        assert!(!response.listing_blocked);
        assert_eq!(response.notifications_sent, 2);
        let owner_notes = w.s.db.notifications_for(w.owner).unwrap();
        assert!(owner_notes[0].message.ends_with("Причина: дубль"));
    }

    #[test]
    fn rejection_requires_a_reason_and_quotes_it() {
        let w = world();
        let err = moderate(&w.s, w.report, &request(ModerationStatus::Rejected, "  "), w.moderator)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref e) if e.contains_key("moderation_reason")));
        assert_eq!(
            w.s.db.get_report(w.report).unwrap().unwrap().moderation_status,
            ModerationStatus::Pending
        );

        moderate(&w.s, w.report, &request(ModerationStatus::Rejected, " no evidence "), w.moderator)
            .unwrap();
        let notes = w.s.db.notifications_for(w.reporter).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Скаргу відхилено");
        assert!(notes[0].message.ends_with("Причина: no evidence"));
        assert!(w.s.db.notifications_for(w.owner).unwrap().is_empty());
    }

    #[test]
    fn in_review_notifies_reporter_only() {
        let w = world();
        let response =
            moderate(&w.s, w.report, &request(ModerationStatus::InReview, ""), w.moderator)
                .unwrap();
        assert_eq!(response.notifications_sent, 1);
        assert!(!response.listing_blocked);
        assert_eq!(
            w.s.db.notifications_for(w.reporter).unwrap()[0].title,
            "Скарга на розгляді"
        );
    }

    #[test]
    fn returning_to_pending_clears_reviewer() {
        let w = world();
        moderate(&w.s, w.report, &request(ModerationStatus::InReview, ""), w.moderator).unwrap();
        let response =
            moderate(&w.s, w.report, &request(ModerationStatus::Pending, ""), w.moderator).unwrap();
        assert_eq!(response.notifications_sent, 0);
        assert_eq!(response.report.reviewed_by, None);
        assert_eq!(response.report.reviewed_at, None);
    }

    #[test]
    fn orphan_listing_approval_notifies_reporter_only() {
        let w = world();
        let orphan = w.s.db.insert_listing(None, &fields("Orphan"), t0()).unwrap();
        let report = w
            .s
            .db
            .insert_report(orphan, w.reporter, ReportReason::Other, "", t0())
            .unwrap();
        let response =
            moderate(&w.s, report, &request(ModerationStatus::Approved, ""), w.moderator).unwrap();
        assert_eq!(response.notifications_sent, 1);
        assert!(response.listing_blocked);
    }

    #[test]
    fn unknown_report_is_not_found() {
        let w = world();
        assert!(matches!(
            moderate(&w.s, 999, &request(ModerationStatus::Approved, ""), w.moderator),
            Err(ApiError::NotFound)
        ));
    }
}
