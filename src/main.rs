use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wechat_fans_indexer::api::{self, AppState};
use wechat_fans_indexer::config::Config;
use wechat_fans_indexer::db::init_database;
use wechat_fans_indexer::service::{FanManager, TagManager};
use wechat_fans_indexer::sync::{schedule, SyncOptions, SyncRuntime};
use wechat_fans_indexer::wechat::WeChatClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,wechat_fans_indexer=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::init()?;
    info!("Initialized configuration");

    // Initialize database
    let db = Arc::new(init_database().await?);
    info!("Connected to database");

    // Wire the directory client and the sync runtime
    let client = WeChatClient::new(&config.wechat)?;
    let runtime = Arc::new(SyncRuntime::new(
        db.clone(),
        client,
        SyncOptions::from_config(&config.sync),
    ));

    let state = AppState {
        db: db.clone(),
        fans: FanManager::new(db.get_pool().clone()),
        tags: TagManager::new(db.get_pool().clone()),
        sync: runtime.clone(),
    };

    // Start the daily sync scheduler
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = schedule::run_scheduler(runtime).await {
            error!("Sync scheduler error: {}", e);
        }
    });

    // Start the admin API server
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(state).await {
            error!("API server error: {}", e);
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => info!("Shutdown signal received, initiating graceful shutdown"),
        _ = scheduler_handle => error!("Sync scheduler exited unexpectedly"),
        _ = api_handle => error!("API server exited unexpectedly"),
    }

    info!("WeChat fans indexer shutdown complete");
    Ok(())
}
