use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use notify_hub::client::{AnalyticsClient, RemoteBackend};
use notify_hub::config;
use notify_hub::tally::{TallyOptions, UnreadTally};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Follow a recipient's unread notification count on a running hub"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Recipient whose notifications are counted
    #[arg(long)]
    recipient: String,

    /// Mark these notification ids read before watching
    #[arg(long = "mark-read")]
    mark_read: Vec<Uuid>,

    /// Mark every unread notification read before watching
    #[arg(long = "mark-all-read")]
    mark_all_read: bool,

    /// Print the badge once and exit
    #[arg(long)]
    once: bool,
}

fn render(badge: Option<u64>) -> String {
    match badge {
        None => "(no unread notifications)".to_string(),
        Some(n) if n > 99 => "[99+]".to_string(),
        Some(n) => format!("[{n}]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let backend = Arc::new(RemoteBackend::new(&cfg.bell.server_url)?);
    let analytics = AnalyticsClient::new(&cfg.analytics.track_url);
    let tally = UnreadTally::mount(backend, args.recipient.clone(), TallyOptions::from(&cfg.bell))
        .await
        .context("failed to mount unread tally")?;

    for id in &args.mark_read {
        match tally.mark_as_read(*id).await {
            Ok(changed) => {
                info!(%id, changed, "mark as read");
                analytics
                    .track("notification_read", json!({ "id": id, "changed": changed }))
                    .await;
            }
            Err(err) => warn!(?err, %id, "mark as read failed"),
        }
    }

    if args.mark_all_read {
        match tally.mark_all_as_read().await {
            Ok(updated) => {
                info!(updated, "mark all as read");
                analytics
                    .track("notifications_read_all", json!({ "updated": updated }))
                    .await;
            }
            Err(err) => warn!(?err, "mark all as read failed"),
        }
    }

    println!("{}", render(tally.badge()));
    if args.once {
        return Ok(());
    }

    let mut rx = tally.watch();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *rx.borrow_and_update();
                println!("{}", render((count > 0).then_some(count)));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    tally.unmount();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn badge_rendering() {
        assert_eq!(render(None), "(no unread notifications)");
        assert_eq!(render(Some(3)), "[3]");
        assert_eq!(render(Some(99)), "[99]");
        assert_eq!(render(Some(100)), "[99+]");
    }
}
