use axum::{
    Extension, Form, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{debug, info};

use oselya_db::models::{ChatMessageRow, ThreadRow};
use oselya_types::api::{
    ChatMessageView, InboxResponse, PollQuery, PollResponse, SendMessageForm,
    SendMessageResponse, ThreadPage, ThreadSummary,
};

use crate::auth::{AppState, AppStateInner, blocking};
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::negotiate::{Negotiated, RequestMode, back_target, with_query_param};
use crate::presence::{format_time, last_seen_human, user_summary};

/// A chat action that either happened or was refused for a reason the
/// client should be told about.
#[derive(Debug)]
pub enum ChatOutcome<T> {
    Done(T),
    Forbidden,
    EmptyMessage,
}

#[derive(Debug)]
pub struct Sent {
    pub thread_id: i64,
    pub message: ChatMessageRow,
}

pub fn message_view(message: &ChatMessageRow, viewer_id: i64) -> ChatMessageView {
    ChatMessageView {
        id: message.id,
        text: message.text.clone(),
        created_at: format_time(message.created_at),
        is_me: message.sender_id == viewer_id,
    }
}

/// Lenient `after_id`: anything unparseable or negative means "from the start".
pub fn parse_after_id(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0)
        .max(0)
}

/// First message from a tenant about a listing.
///
/// The thread is provisioned before the text is checked, so an empty
/// message still leaves the (listing, owner, sender) thread in place.
pub fn send_to_listing(
    s: &AppStateInner,
    listing_id: i64,
    sender_id: i64,
    text: &str,
) -> Result<ChatOutcome<Sent>, ApiError> {
    let listing = s
        .db
        .get_listing(listing_id)?
        .filter(|l| l.is_active)
        .ok_or(ApiError::NotFound)?;

    let Some(landlord_id) = listing.owner_id.filter(|owner| *owner != sender_id) else {
        return Ok(ChatOutcome::Forbidden);
    };

    let now = s.now();
    let (thread_id, created) = s
        .db
        .get_or_create_thread(listing.id, landlord_id, sender_id, now)?;
    if created {
        info!(
            "Opened chat thread {} on listing {} between {} and {}",
            thread_id, listing.id, landlord_id, sender_id
        );
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(ChatOutcome::EmptyMessage);
    }

    let message = s
        .db
        .insert_chat_message(thread_id, sender_id, landlord_id, text, now)?;
    Ok(ChatOutcome::Done(Sent { thread_id, message }))
}

/// Reply inside an existing thread; the recipient is the other participant.
pub fn send_to_thread(
    s: &AppStateInner,
    thread_id: i64,
    sender_id: i64,
    text: &str,
) -> Result<ChatOutcome<Sent>, ApiError> {
    let thread = s.db.get_thread(thread_id)?.ok_or(ApiError::NotFound)?;
    if !thread.is_participant(sender_id) {
        return Ok(ChatOutcome::Forbidden);
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(ChatOutcome::EmptyMessage);
    }

    let recipient_id = thread.counterparty(sender_id).id;
    let message = s
        .db
        .insert_chat_message(thread.id, sender_id, recipient_id, text, s.now())?;
    Ok(ChatOutcome::Done(Sent {
        thread_id: thread.id,
        message,
    }))
}

/// Incremental poll. Returned messages addressed to the viewer become read.
pub fn poll(
    s: &AppStateInner,
    thread_id: i64,
    viewer_id: i64,
    after_id: i64,
) -> Result<ChatOutcome<Vec<ChatMessageRow>>, ApiError> {
    let thread = s.db.get_thread(thread_id)?.ok_or(ApiError::NotFound)?;
    if !thread.is_participant(viewer_id) {
        return Ok(ChatOutcome::Forbidden);
    }
    let messages = s.db.fetch_after(thread.id, viewer_id, after_id)?;
    debug!(
        "Poll of thread {} after {} returned {} messages",
        thread.id,
        after_id,
        messages.len()
    );
    Ok(ChatOutcome::Done(messages))
}

/// Open a thread for reading: everything addressed to the viewer is marked
/// read and the full history is returned.
pub fn open_thread(
    s: &AppStateInner,
    thread_id: i64,
    viewer_id: i64,
) -> Result<ChatOutcome<ThreadPage>, ApiError> {
    let thread = s.db.get_thread(thread_id)?.ok_or(ApiError::NotFound)?;
    if !thread.is_participant(viewer_id) {
        return Ok(ChatOutcome::Forbidden);
    }

    s.db.mark_thread_read(thread.id, viewer_id)?;
    let messages = s.db.messages_after(thread.id, 0)?;
    let other = thread.counterparty(viewer_id);

    Ok(ChatOutcome::Done(ThreadPage {
        thread_id: thread.id,
        listing_id: thread.listing_id,
        listing_title: thread.listing_title.clone(),
        other_user: user_summary(other),
        other_last_seen: other.last_seen_at,
        other_last_seen_human: last_seen_human(other.last_seen_at, s.now()),
        messages: messages.iter().map(|m| message_view(m, viewer_id)).collect(),
    }))
}

fn thread_summary(thread: &ThreadRow, viewer_id: i64, s: &AppStateInner) -> ThreadSummary {
    let other = thread.counterparty(viewer_id);
    ThreadSummary {
        id: thread.id,
        listing_id: thread.listing_id,
        listing_title: thread.listing_title.clone(),
        landlord: user_summary(&thread.landlord),
        tenant: user_summary(&thread.tenant),
        counterparty: user_summary(other),
        counterparty_last_seen: other.last_seen_at,
        counterparty_last_seen_human: last_seen_human(other.last_seen_at, s.now()),
        updated_at: thread.updated_at,
    }
}

pub const INBOX_TABS: [&str; 3] = ["incoming", "outgoing", "unread"];

pub fn inbox(s: &AppStateInner, user_id: i64, tab: Option<&str>) -> Result<InboxResponse, ApiError> {
    let active_tab = tab
        .filter(|t| INBOX_TABS.contains(t))
        .unwrap_or("incoming")
        .to_string();

    let summarize = |rows: Vec<ThreadRow>| -> Vec<ThreadSummary> {
        rows.iter().map(|t| thread_summary(t, user_id, s)).collect()
    };
    let incoming_threads = summarize(s.db.threads_as_landlord(user_id)?);
    let outgoing_threads = summarize(s.db.threads_as_tenant(user_id)?);
    let unread_threads = summarize(s.db.threads_with_unread(user_id)?);

    let current_threads = match active_tab.as_str() {
        "outgoing" => outgoing_threads.clone(),
        "unread" => unread_threads.clone(),
        _ => incoming_threads.clone(),
    };

    Ok(InboxResponse {
        active_tab,
        current_threads,
        incoming_threads,
        outgoing_threads,
        unread_threads,
    })
}

// -- Handlers --

pub async fn listing_message_page(Path(listing_id): Path<i64>) -> Redirect {
    Redirect::to(&format!("/listing/{listing_id}/"))
}

pub async fn send_listing_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(listing_id): Path<i64>,
    mode: RequestMode,
    headers: HeaderMap,
    Form(form): Form<SendMessageForm>,
) -> Result<Response, ApiError> {
    let sender_id = claims.sub;
    let text = form.message_text;
    let outcome = blocking(&state, move |s| {
        send_to_listing(s, listing_id, sender_id, &text)
    })
    .await?;

    let listing_page = format!("/listing/{listing_id}/");
    let reopen = back_target(form.next.as_deref(), &headers)
        .map(|target| with_query_param(&target, "open_message", "1"))
        .unwrap_or_else(|| listing_page.clone());

    let negotiated = match outcome {
        ChatOutcome::Done(sent) => Negotiated::ok(
            StatusCode::OK,
            SendMessageResponse {
                ok: true,
                thread_id: Some(sent.thread_id),
                message: message_view(&sent.message, sender_id),
            },
            reopen,
        ),
        ChatOutcome::Forbidden => Negotiated::refused(StatusCode::FORBIDDEN, "forbidden", listing_page),
        ChatOutcome::EmptyMessage => {
            Negotiated::refused(StatusCode::BAD_REQUEST, "empty_message", reopen)
        }
    };
    Ok(negotiated.respond(mode))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub tab: Option<String>,
}

pub async fn inbox_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<InboxQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(&state, move |s| inbox(s, claims.sub, query.tab.as_deref())).await?;
    Ok(Json(page))
}

pub async fn thread_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<i64>,
    mode: RequestMode,
) -> Result<Response, ApiError> {
    let outcome = blocking(&state, move |s| open_thread(s, thread_id, claims.sub)).await?;
    Ok(match outcome {
        ChatOutcome::Done(page) => Json(page).into_response(),
        _ => Negotiated::refused(StatusCode::FORBIDDEN, "forbidden", "/cabinet/messages/")
            .respond(mode),
    })
}

pub async fn thread_reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<i64>,
    mode: RequestMode,
    Form(form): Form<SendMessageForm>,
) -> Result<Response, ApiError> {
    let sender_id = claims.sub;
    let outcome = blocking(&state, move |s| {
        send_to_thread(s, thread_id, sender_id, &form.message_text)
    })
    .await?;

    let thread_url = format!("/cabinet/messages/{thread_id}/");
    let negotiated = match outcome {
        ChatOutcome::Done(sent) => Negotiated::ok(
            StatusCode::OK,
            SendMessageResponse {
                ok: true,
                thread_id: None,
                message: message_view(&sent.message, sender_id),
            },
            thread_url,
        ),
        ChatOutcome::Forbidden => {
            Negotiated::refused(StatusCode::FORBIDDEN, "forbidden", "/cabinet/messages/")
        }
        ChatOutcome::EmptyMessage => {
            Negotiated::refused(StatusCode::BAD_REQUEST, "empty_message", thread_url)
        }
    };
    Ok(negotiated.respond(mode))
}

pub async fn poll_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<i64>,
    Query(query): Query<PollQuery>,
) -> Result<Response, ApiError> {
    let viewer_id = claims.sub;
    let after_id = parse_after_id(query.after_id.as_deref());
    let outcome = blocking(&state, move |s| poll(s, thread_id, viewer_id, after_id)).await?;

    match outcome {
        ChatOutcome::Done(messages) => Ok(Json(PollResponse {
            ok: true,
            messages: messages.iter().map(|m| message_view(m, viewer_id)).collect(),
        })
        .into_response()),
        _ => Err(ApiError::Forbidden),
    }
}
