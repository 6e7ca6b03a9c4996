#![allow(dead_code)]

use notify_hub::db;
use notify_hub::store::NotificationStore;
use notify_hub::tally::UnreadTally;
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;

pub async fn setup_store(capacity: usize) -> NotificationStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    NotificationStore::new(pool, capacity)
}

pub async fn wait_for_count(tally: &UnreadTally, expected: u64) {
    let mut rx = tally.watch();
    let reached = tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|c| *c == expected))
        .await
        .is_ok();
    assert!(
        reached,
        "tally stuck at {} waiting for {}",
        tally.count(),
        expected
    );
}
