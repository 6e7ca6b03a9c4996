//! Notification store: the SQL repository plus a realtime change feed.
use crate::backend::{ChangeStream, FeedItem, NotificationBackend};
use crate::db::{self, Pool};
use crate::model::{ChangeEvent, NewNotification, Notification};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct NotificationStore {
    pool: Pool,
    feed: broadcast::Sender<ChangeEvent>,
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("subscribers", &self.feed.receiver_count())
            .finish_non_exhaustive()
    }
}

impl NotificationStore {
    pub fn new(pool: Pool, feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.max(1));
        Self { pool, feed }
    }

    /// Live subscriptions across all recipients.
    pub fn subscriber_count(&self) -> usize {
        self.feed.receiver_count()
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error: nobody is listening right now.
        if let Err(err) = self.feed.send(event) {
            debug!(kind = err.0.as_str(), "change event had no subscribers");
        }
    }

    #[instrument(skip_all, fields(recipient_id = %new.recipient_id))]
    pub async fn create(&self, new: NewNotification) -> Result<Notification> {
        let notification = db::insert_notification(&self.pool, &new).await?;
        info!(id = %notification.id, kind = %notification.kind, "notification created");
        self.publish(ChangeEvent::Insert(notification.clone()));
        Ok(notification)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        db::get_notification(&self.pool, id).await
    }

    pub async fn list(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        db::list_notifications(&self.pool, recipient_id, unread_only, limit).await
    }

    pub async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        db::count_unread(&self.pool, recipient_id).await
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<Option<Notification>> {
        let updated = db::mark_read(&self.pool, id).await?;
        if let Some(n) = &updated {
            info!(id = %n.id, recipient_id = %n.recipient_id, "notification marked read");
            self.publish(ChangeEvent::Update(n.clone()));
        }
        Ok(updated)
    }

    pub async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let updated = db::mark_all_read(&self.pool, recipient_id).await?;
        let count = updated.len() as u64;
        for n in updated {
            self.publish(ChangeEvent::Update(n));
        }
        info!(recipient_id, count, "notifications marked read");
        Ok(count)
    }

    /// Raw receiver over every recipient's events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Subscription filtered to one recipient. Dropping the stream releases it.
    pub fn subscribe_recipient(&self, recipient_id: &str) -> ChangeStream {
        filtered(self.feed.subscribe(), recipient_id.to_string())
    }
}

fn filtered(rx: broadcast::Receiver<ChangeEvent>, recipient_id: String) -> ChangeStream {
    Box::pin(stream::unfold(
        (rx, recipient_id),
        |(mut rx, recipient_id)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.notification().recipient_id == recipient_id => {
                        return Some((FeedItem::Change(event), (rx, recipient_id)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        return Some((FeedItem::Lagged(skipped), (rx, recipient_id)));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    ))
}

#[async_trait]
impl NotificationBackend for NotificationStore {
    async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        NotificationStore::count_unread(self, recipient_id).await
    }

    async fn mark_read(&self, id: Uuid) -> Result<Option<Notification>> {
        NotificationStore::mark_read(self, id).await
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        NotificationStore::mark_all_read(self, recipient_id).await
    }

    async fn subscribe(&self, recipient_id: &str) -> Result<ChangeStream> {
        Ok(self.subscribe_recipient(recipient_id))
    }
}
