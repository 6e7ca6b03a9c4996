mod common;

use common::{setup_store, wait_for_count};
use notify_hub::audit::AuditLog;
use notify_hub::backend::NotificationBackend;
use notify_hub::client::RemoteBackend;
use notify_hub::http::{self, AppState};
use notify_hub::mailer::LogMailer;
use notify_hub::model::NewNotification;
use notify_hub::store::NotificationStore;
use notify_hub::tally::{TallyOptions, UnreadTally};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn spawn_hub() -> (String, NotificationStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = setup_store(64).await;
    let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).await.unwrap());
    let state = AppState::new(store.clone(), Arc::new(LogMailer::default()), audit);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, http::router(state)).await.unwrap();
    });
    (format!("http://{addr}"), store, dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bell_follows_remote_hub() {
    let (base, store, _dir) = spawn_hub().await;
    store
        .create(NewNotification::new("alice", "msg", "before mount", "m"))
        .await
        .unwrap();

    let backend = Arc::new(RemoteBackend::new(&base).unwrap());
    let opts = TallyOptions {
        reconnect: false,
        ..TallyOptions::default()
    };
    let tally = UnreadTally::mount(backend.clone(), "alice", opts).await.unwrap();
    assert_eq!(tally.count(), 1);

    let mut ids = Vec::new();
    for i in 0..3 {
        let n = store
            .create(NewNotification::new("alice", "msg", format!("live {i}"), "m"))
            .await
            .unwrap();
        ids.push(n.id);
    }
    store
        .create(NewNotification::new("bob", "msg", "not for alice", "m"))
        .await
        .unwrap();
    wait_for_count(&tally, 4).await;

    assert!(tally.mark_as_read(ids[0]).await.unwrap());
    assert!(!tally.mark_as_read(ids[0]).await.unwrap());
    assert!(!tally.mark_as_read(uuid::Uuid::new_v4()).await.unwrap());
    assert_eq!(tally.count(), 3);
    assert_eq!(backend.count_unread("alice").await.unwrap(), 3);

    assert_eq!(tally.mark_all_as_read().await.unwrap(), 3);
    assert_eq!(tally.count(), 0);
    assert_eq!(store.count_unread("bob").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_the_bell_drops_the_server_subscription() {
    let (base, store, _dir) = spawn_hub().await;
    let backend = Arc::new(RemoteBackend::new(&base).unwrap());
    let tally = UnreadTally::mount(backend, "alice", TallyOptions::default())
        .await
        .unwrap();
    assert_eq!(store.subscriber_count(), 1);

    drop(tally);
    // the server notices the closed connection on its next write
    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while store.subscriber_count() != 0 {
            let _ = store
                .create(NewNotification::new("alice", "msg", "ping", "m"))
                .await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(released.is_ok());
}
