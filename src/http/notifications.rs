use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::info;
use uuid::Uuid;

use super::dto::{ListParams, MarkReadResponse, ReadAllResponse, UnreadCountResponse};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::backend::FeedItem;
use crate::db::DEFAULT_LIST_LIMIT;
use crate::model::{NewNotification, Notification};

const MAX_LIST_LIMIT: i64 = 200;

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid notification id"))
}

pub async fn create(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let new: NewNotification = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid notification: {e}")))?;
    if new.recipient_id.trim().is_empty() {
        return Err(ApiError::bad_request("recipient_id is required"));
    }
    let created = state.store.create(new).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let id = parse_id(&id)?;
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Notification not found".into()))
}

/// Idempotent: a second call answers `changed: false` with the current row.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MarkReadResponse>> {
    let id = parse_id(&id)?;
    if let Some(notification) = state.store.mark_read(id).await? {
        return Ok(Json(MarkReadResponse {
            changed: true,
            notification,
        }));
    }
    let notification = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".into()))?;
    Ok(Json(MarkReadResponse {
        changed: false,
        notification,
    }))
}

pub async fn list(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let rows = state
        .store
        .list(&recipient_id, params.unread_only, limit)
        .await?;
    Ok(Json(rows))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let count = state.store.count_unread(&recipient_id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn read_all(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
) -> ApiResult<Json<ReadAllResponse>> {
    let updated = state.store.mark_all_read(&recipient_id).await?;
    Ok(Json(ReadAllResponse { updated }))
}

fn to_event(item: FeedItem) -> Event {
    match item {
        FeedItem::Change(change) => {
            let data = serde_json::to_string(change.notification()).unwrap_or_default();
            Event::default().event(change.as_str()).data(data)
        }
        FeedItem::Lagged(skipped) => Event::default().event("lagged").data(skipped.to_string()),
    }
}

/// Server-sent change feed for one recipient. Closing the connection drops the
/// subscription.
pub async fn stream(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(%recipient_id, "notification stream opened");
    let feed = state
        .store
        .subscribe_recipient(&recipient_id)
        .map(|item| Ok(to_event(item)));
    Sse::new(feed).keep_alive(KeepAlive::default())
}
