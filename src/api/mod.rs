// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

pub mod handlers;

use crate::config::Config;
use crate::db::Database;
use crate::service::{FanManager, TagManager};
use crate::sync::SyncRuntime;
use anyhow::Result;
use axum::routing::{get, post, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub fans: FanManager,
    pub tags: TagManager,
    pub sync: Arc<SyncRuntime>,
}

/// Start the admin API server
pub async fn start_api_server(state: AppState) -> Result<()> {
    let config = Config::get();

    // Set up CORS
    let cors = if config.server.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::permissive()
    };

    // Create router with all routes
    let app = Router::new()
        // General routes
        .route("/health", get(handlers::health::health_check))
        // Account routes
        .route("/api/accounts", get(handlers::accounts::get_accounts))
        // Fan routes
        .route(
            "/api/accounts/:account_id/fans",
            get(handlers::fans::get_fans),
        )
        .route(
            "/api/accounts/:account_id/fans/stats",
            get(handlers::fans::get_fan_statistics),
        )
        .route(
            "/api/accounts/:account_id/fans/export",
            get(handlers::fans::export_fans),
        )
        .route(
            "/api/accounts/:account_id/fans/:openid",
            get(handlers::fans::get_fan),
        )
        .route(
            "/api/accounts/:account_id/fans/:openid/remark",
            put(handlers::fans::update_remark),
        )
        // Tag routes
        .route(
            "/api/accounts/:account_id/tags",
            get(handlers::tags::get_tags).post(handlers::tags::create_tag),
        )
        .route(
            "/api/accounts/:account_id/tags/stats",
            get(handlers::tags::get_tag_statistics),
        )
        .route(
            "/api/accounts/:account_id/tags/reconcile-counts",
            post(handlers::tags::reconcile_tag_counts),
        )
        .route(
            "/api/accounts/:account_id/tags/:tagid",
            put(handlers::tags::rename_tag).delete(handlers::tags::delete_tag),
        )
        .route(
            "/api/accounts/:account_id/tags/:tagid/fans",
            get(handlers::tags::get_tag_fans),
        )
        .route(
            "/api/accounts/:account_id/tags/:tagid/assign",
            post(handlers::tags::assign_tag),
        )
        .route(
            "/api/accounts/:account_id/tags/:tagid/unassign",
            post(handlers::tags::unassign_tag),
        )
        // On-demand sync triggers
        .route("/api/sync/:job", post(handlers::sync::trigger_sync))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Get bind address
    let addr = format!("{}:{}", config.server.host, config.server.port).parse::<SocketAddr>()?;

    // Start server
    info!("Starting API server on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
