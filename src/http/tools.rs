use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::dto::{DonationEventRequest, EmailResponse, HashResponse, TrackRequest};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::hash;
use crate::mailer::EmailMessage;
use crate::model::DonationEvent;

/// `{password}` → `{hash: "<salt>:<derived>"}`.
pub async fn hash_password(body: Bytes) -> ApiResult<Json<HashResponse>> {
    let password = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("password").and_then(Value::as_str).map(str::to_owned))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Password is required"))?;

    let hashed = tokio::task::spawn_blocking(move || hash::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(HashResponse { hash: hashed }))
}

/// Hands the message to the configured mailer. Nothing is validated up front;
/// every failure is a 500.
pub async fn email(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<EmailResponse>> {
    let message: EmailMessage = serde_json::from_slice(&body).map_err(|e| {
        warn!(?e, "unreadable email request");
        ApiError::Internal(e.to_string())
    })?;
    state.mailer.send(&message).await.map_err(|e| {
        warn!(error = %e, "email send failed");
        ApiError::Internal(e.to_string())
    })?;
    Ok(Json(EmailResponse { success: true }))
}

pub async fn track(body: Bytes) -> ApiResult<StatusCode> {
    let req: TrackRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid event: {e}")))?;
    info!(target: "analytics", event = %req.event, data = %req.data, "track");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_donation_event(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let req: DonationEventRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid donation event: {e}")))?;
    if req.donation_id.trim().is_empty() {
        return Err(ApiError::bad_request("donation_id is required"));
    }
    let event = DonationEvent {
        timestamp: Utc::now(),
        event: req.event,
        donation_id: req.donation_id,
        user_id: req.user_id,
        amount_cents: req.amount_cents,
        currency: req.currency,
        details: req.details,
    };
    state.audit.record(&event).await?;
    Ok(StatusCode::CREATED)
}
