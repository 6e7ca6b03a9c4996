//! HTTP clients for the hub: the remote notification backend used by the bell,
//! and the fire-and-forget analytics tracker.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{ChangeStream, FeedItem, NotificationBackend};
use crate::http::dto::{MarkReadResponse, ReadAllResponse, UnreadCountResponse};
use crate::model::{ChangeEvent, Notification};

#[derive(Clone)]
pub struct RemoteBackend {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RemoteBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid hub base URL")?;
        let http = Client::builder()
            .user_agent("notify-hub-bell/0.1")
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("hub base URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl NotificationBackend for RemoteBackend {
    async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        let url = self.endpoint(&["recipients", recipient_id, "unread_count"])?;
        let res = self.http.get(url).send().await.context("failed to reach hub")?;
        if !res.status().is_success() {
            return Err(anyhow!("unread count failed: {}", res.status()));
        }
        let body: UnreadCountResponse = res.json().await.context("invalid unread count body")?;
        Ok(body.count)
    }

    async fn mark_read(&self, id: Uuid) -> Result<Option<Notification>> {
        let id = id.to_string();
        let url = self.endpoint(&["notifications", id.as_str(), "read"])?;
        let res = self.http.post(url).send().await.context("failed to reach hub")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("mark read failed {}: {}", status, body));
        }
        let body: MarkReadResponse = res.json().await.context("invalid mark read body")?;
        Ok(body.changed.then_some(body.notification))
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let url = self.endpoint(&["recipients", recipient_id, "read_all"])?;
        let res = self.http.post(url).send().await.context("failed to reach hub")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("mark all read failed {}: {}", status, body));
        }
        let body: ReadAllResponse = res.json().await.context("invalid read all body")?;
        Ok(body.updated)
    }

    async fn subscribe(&self, recipient_id: &str) -> Result<ChangeStream> {
        let url = self.endpoint(&["recipients", recipient_id, "stream"])?;
        let res = self
            .http
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .context("failed to open notification stream")?;
        if !res.status().is_success() {
            return Err(anyhow!("notification stream refused: {}", res.status()));
        }
        let body = res.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed();
        Ok(sse_stream(body))
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buf: Vec<u8>,
    pending: VecDeque<FeedItem>,
}

impl SseState {
    fn drain_frames(&mut self) {
        while let Some(end) = find_frame_end(&self.buf) {
            let frame = self.buf[..end.0].to_vec();
            self.buf.drain(..end.0 + end.1);
            if let Some(item) = parse_frame(&String::from_utf8_lossy(&frame)) {
                self.pending.push_back(item);
            }
        }
    }
}

/// Returns (frame length, separator length) for the first blank-line boundary.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn sse_stream(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> ChangeStream {
    let state = SseState {
        body,
        buf: Vec::new(),
        pending: VecDeque::new(),
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(&chunk);
                    st.drain_frames();
                }
                Some(Err(err)) => {
                    warn!(?err, "notification stream broke");
                    return None;
                }
                None => {
                    debug!("notification stream ended");
                    return None;
                }
            }
        }
    }))
}

/// Decode one server-sent event. Comments, keep-alives and unknown event
/// names yield `None`.
pub fn parse_frame(frame: &str) -> Option<FeedItem> {
    let mut event = "message";
    let mut data = String::new();
    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = value,
            "data" => {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            _ => {}
        }
    }

    match event {
        "insert" | "update" => {
            let n: Notification = match serde_json::from_str(&data) {
                Ok(n) => n,
                Err(err) => {
                    warn!(?err, event, "undecodable notification event");
                    return None;
                }
            };
            Some(FeedItem::Change(if event == "insert" {
                ChangeEvent::Insert(n)
            } else {
                ChangeEvent::Update(n)
            }))
        }
        "lagged" => data.trim().parse().ok().map(FeedItem::Lagged),
        _ => None,
    }
}

/// Posts `{event, data}` to the analytics sink. Never fails the caller.
#[derive(Clone)]
pub struct AnalyticsClient {
    http: Client,
    track_url: Option<Url>,
}

impl fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("track_url", &self.track_url)
            .finish_non_exhaustive()
    }
}

impl AnalyticsClient {
    /// An empty or unparsable URL disables tracking.
    pub fn new(track_url: &str) -> Self {
        let track_url = match track_url.trim() {
            "" => None,
            raw => Url::parse(raw)
                .map_err(|err| warn!(?err, raw, "analytics disabled: bad track url"))
                .ok(),
        };
        Self {
            http: Client::new(),
            track_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.track_url.is_some()
    }

    pub async fn track(&self, event: &str, data: Value) {
        let Some(url) = self.track_url.clone() else {
            return;
        };
        let body = json!({ "event": event, "data": data });
        match self.http.post(url).json(&body).send().await {
            Ok(res) if !res.status().is_success() => {
                debug!(status = %res.status(), event, "analytics sink refused event");
            }
            Ok(_) => {}
            Err(err) => debug!(?err, event, "analytics tracking failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id: "alice".into(),
            kind: "msg".into(),
            title: "t".into(),
            message: "m".into(),
            data: json!({}),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parses_insert_and_update_frames() {
        let n = sample();
        let data = serde_json::to_string(&n).unwrap();
        let insert = parse_frame(&format!("event: insert\ndata: {data}")).unwrap();
        assert_eq!(insert, FeedItem::Change(ChangeEvent::Insert(n.clone())));
        let update = parse_frame(&format!("event:update\r\ndata:{data}\r")).unwrap();
        assert_eq!(update, FeedItem::Change(ChangeEvent::Update(n)));
    }

    #[test]
    fn parses_lag_and_ignores_noise() {
        assert_eq!(parse_frame("event: lagged\ndata: 7"), Some(FeedItem::Lagged(7)));
        assert_eq!(parse_frame(":keep-alive"), None);
        assert_eq!(parse_frame("event: ping\ndata: {}"), None);
        assert_eq!(parse_frame("event: insert\ndata: not json"), None);
    }

    #[tokio::test]
    async fn stream_reassembles_split_frames() {
        let n = sample();
        let wire = format!(
            ":\n\nevent: insert\ndata: {}\n\nevent: lagged\ndata: 2\n\n",
            serde_json::to_string(&n).unwrap()
        )
        .into_bytes();
        let chunks: Vec<reqwest::Result<Vec<u8>>> =
            wire.chunks(7).map(|c| Ok(c.to_vec())).collect();
        let items: Vec<FeedItem> = sse_stream(stream::iter(chunks).boxed()).collect().await;
        assert_eq!(
            items,
            vec![
                FeedItem::Change(ChangeEvent::Insert(n)),
                FeedItem::Lagged(2)
            ]
        );
    }

    #[test]
    fn endpoint_encodes_segments() {
        let backend = RemoteBackend::new("http://127.0.0.1:3001/").unwrap();
        let url = backend
            .endpoint(&["recipients", "a b/c", "unread_count"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:3001/recipients/a%20b%2Fc/unread_count"
        );
    }

    #[tokio::test]
    async fn analytics_disabled_is_silent() {
        let client = AnalyticsClient::new("");
        assert!(!client.is_enabled());
        client.track("noop", json!({})).await;
        // unreachable sink: error is swallowed
        let client = AnalyticsClient::new("http://127.0.0.1:9/api/track");
        assert!(client.is_enabled());
        client.track("notification_read", json!({"id": 1})).await;
    }
}
