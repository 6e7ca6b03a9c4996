use super::model::NotificationRow;
use crate::model::{NewNotification, Notification};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

const COLUMNS: &str = "id, recipient_id, type, title, message, data, read, created_at";

/// Default page size for listings when the caller gives none.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists, and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all, fields(recipient_id = %new.recipient_id))]
pub async fn insert_notification(pool: &Pool, new: &NewNotification) -> Result<Notification> {
    if new.recipient_id.trim().is_empty() {
        return Err(anyhow!("recipient_id must be non-empty"));
    }
    let id = Uuid::new_v4();
    let data = serde_json::to_string(&new.data).context("failed to encode notification data")?;
    let row: NotificationRow = sqlx::query_as(&format!(
        "INSERT INTO notifications (id, recipient_id, type, title, message, data, read, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?) RETURNING {COLUMNS}"
    ))
    .bind(id.to_string())
    .bind(&new.recipient_id)
    .bind(&new.kind)
    .bind(&new.title)
    .bind(&new.message)
    .bind(data)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to insert notification")?;
    row.try_into()
}

#[instrument(skip_all)]
pub async fn get_notification(pool: &Pool, id: Uuid) -> Result<Option<Notification>> {
    let row: Option<NotificationRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM notifications WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;
    row.map(Notification::try_from).transpose()
}

/// Newest first. `limit` is clamped to at least one row.
#[instrument(skip_all, fields(recipient_id = %recipient_id))]
pub async fn list_notifications(
    pool: &Pool,
    recipient_id: &str,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>> {
    let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM notifications \
         WHERE recipient_id = ? AND (? = 0 OR read = 0) \
         ORDER BY created_at DESC, rowid DESC LIMIT ?"
    ))
    .bind(recipient_id)
    .bind(unread_only)
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Notification::try_from).collect()
}

#[instrument(skip_all, fields(recipient_id = %recipient_id))]
pub async fn count_unread(pool: &Pool, recipient_id: &str) -> Result<u64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND read = 0",
    )
    .bind(recipient_id)
    .fetch_one(pool)
    .await?;
    Ok(count.max(0) as u64)
}

/// Set `read = 1` on a single row. Returns the row only if it transitioned;
/// already-read and unknown ids yield `None`.
#[instrument(skip_all)]
pub async fn mark_read(pool: &Pool, id: Uuid) -> Result<Option<Notification>> {
    let row: Option<NotificationRow> = sqlx::query_as(&format!(
        "UPDATE notifications SET read = 1 WHERE id = ? AND read = 0 RETURNING {COLUMNS}"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await
    .context("failed to mark notification read")?;
    row.map(Notification::try_from).transpose()
}

/// Mark every unread row of a recipient. Returns the rows that transitioned.
#[instrument(skip_all, fields(recipient_id = %recipient_id))]
pub async fn mark_all_read(pool: &Pool, recipient_id: &str) -> Result<Vec<Notification>> {
    let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
        "UPDATE notifications SET read = 1 WHERE recipient_id = ? AND read = 0 RETURNING {COLUMNS}"
    ))
    .bind(recipient_id)
    .fetch_all(pool)
    .await
    .context("failed to mark notifications read")?;
    rows.into_iter().map(Notification::try_from).collect()
}
