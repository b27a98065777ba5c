use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use oselya_db::models::{NewNotification, NotificationRow};
use oselya_types::api::{CreateNotificationRequest, NotificationView};

use crate::auth::{AppState, AppStateInner, blocking, require_staff};
use crate::error::ApiError;
use crate::middleware::Claims;

const TITLE_MAX_CHARS: usize = 150;

pub fn notification_view(row: &NotificationRow) -> NotificationView {
    NotificationView {
        id: row.id,
        notification_type: row.notification_type,
        type_label: row.notification_type.label().to_string(),
        title: row.title.clone(),
        message: row.message.clone(),
        related_report_id: row.related_report_id,
        is_broadcast: row.recipient_id.is_none(),
        created_at: row.created_at,
    }
}

pub fn feed(s: &AppStateInner, user_id: i64) -> Result<Vec<NotificationView>, ApiError> {
    let rows = s.db.notifications_for(user_id)?;
    Ok(rows.iter().map(notification_view).collect())
}

/// Staff-authored notice, either to one user or, with no recipient, to everyone.
pub fn publish(
    s: &AppStateInner,
    request: &CreateNotificationRequest,
) -> Result<NotificationView, ApiError> {
    let title = request.title.trim();
    if title.is_empty() || title.chars().count() > TITLE_MAX_CHARS {
        return Err(ApiError::field(
            "title",
            format!("Від 1 до {TITLE_MAX_CHARS} символів."),
        ));
    }
    if request.message.trim().is_empty() {
        return Err(ApiError::field("message", "Обов'язкове поле."));
    }
    if let Some(recipient_id) = request.recipient_id {
        if s.db.get_user_by_id(recipient_id)?.is_none() {
            return Err(ApiError::field("recipient_id", "Користувача не знайдено."));
        }
    }

    let new = NewNotification {
        recipient_id: request.recipient_id,
        related_report_id: None,
        notification_type: request.notification_type,
        title: title.to_string(),
        message: request.message.trim().to_string(),
    };
    let now = s.now();
    let id = s.db.insert_notification(&new, now)?;
    info!(
        "Published notification {} to {}",
        id,
        request
            .recipient_id
            .map(|r| format!("user {r}"))
            .unwrap_or_else(|| "everyone".to_string())
    );

    Ok(notification_view(&NotificationRow {
        id,
        recipient_id: new.recipient_id,
        related_report_id: None,
        notification_type: new.notification_type,
        title: new.title,
        message: new.message,
        is_active: true,
        created_at: now,
    }))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let items = blocking(&state, move |s| feed(s, claims.sub)).await?;
    Ok(Json(items))
}

pub async fn create_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = blocking(&state, move |s| {
        require_staff(s, &claims)?;
        publish(s, &request)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn deactivate_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |s| {
        require_staff(s, &claims)?;
        if s.db.deactivate_notification(id)? {
            info!("Deactivated notification {}", id);
            Ok(StatusCode::NO_CONTENT)
        } else {
            Err(ApiError::NotFound)
        }
    })
    .await
}
