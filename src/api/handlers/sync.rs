// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::api::AppState;
use crate::sync::SyncJob;

/// Kick off one sync job in the background. The job logs its own outcome;
/// the response only acknowledges the start.
pub async fn trigger_sync(State(state): State<AppState>, Path(job): Path<String>) -> Response {
    let Some(job) = SyncJob::parse(&job) else {
        let known: Vec<&str> = SyncJob::ALL.iter().map(|j| j.as_str()).collect();
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unknown sync job '{}'", job), "known_jobs": known})),
        )
            .into_response();
    };

    let runtime = state.sync.clone();
    tokio::spawn(async move {
        if let Err(e) = runtime.run(job).await {
            error!(job = %job, error = ?e, "on-demand sync job failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "started", "job": job.as_str()})),
    )
        .into_response()
}
