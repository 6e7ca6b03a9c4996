//! Database module: row models and SQL repository for notifications.
//!
//! - `model`: raw rows as stored in SQLite and their conversion into domain types.
//! - `repo`: SQL-only functions over the `notifications` table.
//!
//! Callers import from `notify_hub::db`; the repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::NotificationRow;
