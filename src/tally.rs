//! Unread tally: the notification bell's client-side view of one recipient.
//!
//! On mount the tally reads the unread count from the backend, then follows the
//! recipient's change feed. Each insert of an unread row bumps the counter; the
//! local mark-as-read action lowers it when the backend reports a transition.
//! Update events, lag and reconnects re-count from the backend. Recounts and
//! local marks hold the same gate, so a recount never lands between a mark and
//! its decrement.
//! Dropping the tally aborts the feed pump, which releases the subscription.

use crate::backend::{ChangeStream, FeedItem, NotificationBackend};
use crate::config;
use crate::model::ChangeEvent;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyOptions {
    /// Resubscribe (and re-count) after the feed ends.
    pub reconnect: bool,
    pub reconnect_base: Duration,
    pub max_backoff: Duration,
}

impl Default for TallyOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl From<&config::Bell> for TallyOptions {
    fn from(bell: &config::Bell) -> Self {
        Self {
            reconnect: bell.reconnect,
            reconnect_base: bell.reconnect_base(),
            max_backoff: bell.max_backoff(),
        }
    }
}

/// `base * 2^attempt`, capped at `cap`. A zero cap leaves the delay uncapped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let delay = base.saturating_mul(1_u32 << attempt.min(10));
    if cap.is_zero() {
        delay
    } else {
        delay.min(cap)
    }
}

pub struct UnreadTally {
    recipient_id: String,
    backend: Arc<dyn NotificationBackend>,
    count: Arc<watch::Sender<u64>>,
    gate: Arc<Mutex<()>>,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for UnreadTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnreadTally")
            .field("recipient_id", &self.recipient_id)
            .field("count", &*self.count.borrow())
            .finish_non_exhaustive()
    }
}

impl UnreadTally {
    pub async fn mount(
        backend: Arc<dyn NotificationBackend>,
        recipient_id: impl Into<String>,
        options: TallyOptions,
    ) -> Result<Self> {
        let recipient_id = recipient_id.into();
        let initial = backend
            .count_unread(&recipient_id)
            .await
            .context("failed to fetch initial unread count")?;
        let stream = backend
            .subscribe(&recipient_id)
            .await
            .context("failed to subscribe to notification feed")?;

        let (tx, _) = watch::channel(initial);
        let count = Arc::new(tx);
        let gate = Arc::new(Mutex::new(()));
        let pump = tokio::spawn(pump(
            Feed {
                backend: backend.clone(),
                recipient_id: recipient_id.clone(),
                count: count.clone(),
                gate: gate.clone(),
            },
            stream,
            options,
        ));
        info!(%recipient_id, unread = initial, "unread tally mounted");

        Ok(Self {
            recipient_id,
            backend,
            count,
            gate,
            pump,
        })
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn count(&self) -> u64 {
        *self.count.borrow()
    }

    /// What the bell shows: nothing at zero, otherwise the count.
    pub fn badge(&self) -> Option<u64> {
        match self.count() {
            0 => None,
            n => Some(n),
        }
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.count.subscribe()
    }

    /// Mark one notification read. Returns `true` when the tally went down;
    /// already-read, unknown, or foreign ids leave it untouched.
    pub async fn mark_as_read(&self, id: Uuid) -> Result<bool> {
        let _gate = self.gate.lock().await;
        match self.backend.mark_read(id).await? {
            Some(n) if n.recipient_id == self.recipient_id => {
                self.count.send_modify(|c| *c = c.saturating_sub(1));
                debug!(%id, unread = self.count(), "notification read");
                Ok(true)
            }
            Some(n) => {
                warn!(%id, owner = %n.recipient_id, "marked a notification of another recipient");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Mark every unread notification of this recipient read, then take the
    /// count from the backend. Returns how many rows transitioned.
    pub async fn mark_all_as_read(&self) -> Result<u64> {
        let _gate = self.gate.lock().await;
        let updated = self.backend.mark_all_read(&self.recipient_id).await?;
        let fresh = self
            .backend
            .count_unread(&self.recipient_id)
            .await
            .context("failed to re-count after marking all read")?;
        self.count.send_replace(fresh);
        debug!(recipient_id = %self.recipient_id, updated, unread = fresh, "notifications read");
        Ok(updated)
    }

    /// Release the subscription.
    pub fn unmount(self) {}
}

impl Drop for UnreadTally {
    fn drop(&mut self) {
        self.pump.abort();
        debug!(recipient_id = %self.recipient_id, "unread tally unmounted");
    }
}

/// What the pump needs to talk back to the backend and the counter.
struct Feed {
    backend: Arc<dyn NotificationBackend>,
    recipient_id: String,
    count: Arc<watch::Sender<u64>>,
    gate: Arc<Mutex<()>>,
}

impl Feed {
    async fn resync(&self) {
        let _gate = self.gate.lock().await;
        match self.backend.count_unread(&self.recipient_id).await {
            Ok(fresh) => {
                let previous = self.count.send_replace(fresh);
                info!(recipient_id = %self.recipient_id, previous, fresh, "unread tally resynced");
            }
            Err(err) => warn!(?err, recipient_id = %self.recipient_id, "failed to resync unread count"),
        }
    }

    /// Fresh subscription followed by a recount, so nothing delivered on the
    /// new stream is already part of the count it starts from.
    async fn resubscribe(&self) -> Result<ChangeStream> {
        let stream = self.backend.subscribe(&self.recipient_id).await?;
        self.resync().await;
        Ok(stream)
    }
}

async fn pump(feed: Feed, mut stream: ChangeStream, options: TallyOptions) {
    let recipient_id = feed.recipient_id.as_str();
    let mut attempt: u32 = 0;
    loop {
        while let Some(item) = stream.next().await {
            attempt = 0;
            match item {
                FeedItem::Change(ChangeEvent::Insert(n))
                    if n.recipient_id == recipient_id && !n.read =>
                {
                    feed.count.send_modify(|c| *c += 1);
                }
                // read here or by another client; the backend has the answer
                FeedItem::Change(ChangeEvent::Update(n)) if n.recipient_id == recipient_id => {
                    feed.resync().await;
                }
                FeedItem::Change(_) => {}
                FeedItem::Lagged(skipped) => {
                    // a lagged receiver still replays what it retained
                    warn!(%recipient_id, skipped, "change feed lagged; resubscribing");
                    match feed.resubscribe().await {
                        Ok(next) => stream = next,
                        Err(err) => {
                            warn!(?err, %recipient_id, "resubscribe after lag failed");
                            break;
                        }
                    }
                }
            }
        }

        if !options.reconnect {
            info!(%recipient_id, "change feed closed; tally stopped");
            return;
        }

        loop {
            let delay = backoff_delay(attempt, options.reconnect_base, options.max_backoff);
            attempt = attempt.saturating_add(1);
            warn!(%recipient_id, attempt, ?delay, "change feed closed; reconnecting");
            tokio::time::sleep(delay).await;
            match feed.resubscribe().await {
                Ok(next) => {
                    stream = next;
                    break;
                }
                Err(err) => warn!(?err, %recipient_id, "resubscribe failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(7, base, cap), cap);
        assert_eq!(backoff_delay(40, base, cap), cap);
    }

    #[test]
    fn zero_cap_is_uncapped() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(10, base, Duration::ZERO), Duration::from_secs(1024));
        assert_eq!(backoff_delay(30, base, Duration::ZERO), Duration::from_secs(1024));
    }

    #[test]
    fn options_from_bell_config() {
        let bell = config::Bell {
            reconnect: false,
            reconnect_base_ms: 250,
            max_backoff_seconds: 5,
            ..config::Bell::default()
        };
        let opts = TallyOptions::from(&bell);
        assert!(!opts.reconnect);
        assert_eq!(opts.reconnect_base, Duration::from_millis(250));
        assert_eq!(opts.max_backoff, Duration::from_secs(5));
    }
}
