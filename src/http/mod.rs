//! HTTP surface: the notification REST + SSE routes and the small utility
//! endpoints (`/hash`, `/email`, `/api/track`, donation audit).

pub mod dto;
pub mod error;
mod notifications;
mod tools;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::audit::AuditLog;
use crate::mailer::Mailer;
use crate::store::NotificationStore;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub store: NotificationStore,
    pub mailer: Arc<dyn Mailer>,
    pub audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(store: NotificationStore, mailer: Arc<dyn Mailer>, audit: Arc<AuditLog>) -> Self {
        Self {
            store,
            mailer,
            audit,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hash", post(tools::hash_password))
        .route("/email", post(tools::email))
        .route("/api/track", post(tools::track))
        .route("/api/donations/events", post(tools::record_donation_event))
        .route("/notifications", post(notifications::create))
        .route("/notifications/{id}", get(notifications::get_one))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route(
            "/recipients/{recipient_id}/notifications",
            get(notifications::list),
        )
        .route(
            "/recipients/{recipient_id}/unread_count",
            get(notifications::unread_count),
        )
        .route(
            "/recipients/{recipient_id}/read_all",
            post(notifications::read_all),
        )
        .route(
            "/recipients/{recipient_id}/stream",
            get(notifications::stream),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
