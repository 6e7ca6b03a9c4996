use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use notify_hub::audit::AuditLog;
use notify_hub::config;
use notify_hub::db;
use notify_hub::http::{self, AppState};
use notify_hub::mailer;
use notify_hub::store::NotificationStore;

#[derive(Debug, Parser)]
#[command(author, version, about = "Notification hub: store, realtime feed and HTTP API")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `app.bind_addr`
    #[arg(long)]
    bind: Option<String>,
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
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
    cfg.ensure_dirs()?;

    let data_dir = cfg.app.resolved_data_dir();
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/notify-hub.db", data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let store = NotificationStore::new(pool, cfg.app.feed_capacity);
    let mailer: Arc<dyn mailer::Mailer> = Arc::from(mailer::from_config(&cfg.email)?);
    let audit = Arc::new(AuditLog::open(cfg.app.audit_log_path()).await?);
    let state = AppState::new(store, mailer, audit);

    let bind_addr = args.bind.unwrap_or_else(|| cfg.app.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "notify-hub listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
