//! Row models returned by repository queries.
//!
//! SQLite stores ids and payloads as TEXT; conversion into
//! [`crate::model::Notification`] happens here so the repository stays SQL-only.

use crate::model::Notification;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .with_context(|| format!("notification id {} is not a uuid", row.id))?;
        let data = serde_json::from_str(&row.data)
            .with_context(|| format!("notification {} has invalid data payload", row.id))?;
        Ok(Notification {
            id,
            recipient_id: row.recipient_id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            data,
            read: row.read,
            created_at: row.created_at,
        })
    }
}
