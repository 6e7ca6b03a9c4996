//! Seam between the unread tally and whatever holds the notifications.
//!
//! The in-process [`crate::store::NotificationStore`] and the HTTP
//! [`crate::client::RemoteBackend`] both implement [`NotificationBackend`].

use crate::model::{ChangeEvent, Notification};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

/// Item delivered by a change-feed subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Change(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
}

/// Subscription stream. Ends when the feed closes or the connection drops.
pub type ChangeStream = BoxStream<'static, FeedItem>;

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Rows with `recipient_id = recipient` and `read = false`.
    async fn count_unread(&self, recipient_id: &str) -> Result<u64>;

    /// Set `read = true`. Returns the row only when it transitioned.
    async fn mark_read(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Set `read = true` on every unread row of the recipient. Returns how
    /// many rows transitioned.
    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64>;

    /// Change feed filtered to one recipient.
    async fn subscribe(&self, recipient_id: &str) -> Result<ChangeStream>;
}
