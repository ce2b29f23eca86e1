// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::api::AppState;
use crate::error::TagError;

#[derive(Debug, Deserialize)]
pub struct TagNameBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenidsBody {
    pub openids: Vec<String>,
}

fn tag_error_response(e: TagError) -> Response {
    let status = match &e {
        TagError::TagNotFound { .. } => StatusCode::NOT_FOUND,
        TagError::TagNameExists { .. } => StatusCode::CONFLICT,
        _ => {
            error!("Tag operation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

/// List all tags of an account
pub async fn get_tags(State(state): State<AppState>, Path(account_id): Path<i32>) -> Response {
    match state.tags.list(account_id).await {
        Ok(tags) => (StatusCode::OK, Json(json!({ "tags": tags }))).into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Create a tag locally
pub async fn create_tag(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
    Json(body): Json<TagNameBody>,
) -> Response {
    match state.tags.create(account_id, &body.name).await {
        Ok(tag) => (StatusCode::CREATED, Json(json!({ "tag": tag }))).into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Rename a tag
pub async fn rename_tag(
    State(state): State<AppState>,
    Path((account_id, tagid)): Path<(i32, i64)>,
    Json(body): Json<TagNameBody>,
) -> Response {
    match state.tags.rename(account_id, tagid, &body.name).await {
        Ok(true) => (StatusCode::OK, Json(json!({"updated": true}))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Tag not found"})),
        )
            .into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Delete a tag (join rows cascade)
pub async fn delete_tag(
    State(state): State<AppState>,
    Path((account_id, tagid)): Path<(i32, i64)>,
) -> Response {
    match state.tags.delete(account_id, tagid).await {
        Ok(true) => (StatusCode::OK, Json(json!({"deleted": true}))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Tag not found"})),
        )
            .into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// True relation counts per tag, largest first
pub async fn get_tag_statistics(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
) -> Response {
    match state.tags.statistics(account_id).await {
        Ok(stats) => (StatusCode::OK, Json(json!({ "tags": stats }))).into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Fans carrying one tag
pub async fn get_tag_fans(
    State(state): State<AppState>,
    Path((account_id, tagid)): Path<(i32, i64)>,
) -> Response {
    match state.tags.fans_by_tag(account_id, tagid).await {
        Ok(fans) => (StatusCode::OK, Json(json!({ "fans": fans }))).into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Assign a tag to a batch of openids
pub async fn assign_tag(
    State(state): State<AppState>,
    Path((account_id, tagid)): Path<(i32, i64)>,
    Json(body): Json<OpenidsBody>,
) -> Response {
    match state.tags.assign(account_id, &body.openids, tagid).await {
        Ok(added) => (
            StatusCode::OK,
            Json(json!({"requested": body.openids.len(), "added": added})),
        )
            .into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Remove a tag from a batch of openids
pub async fn unassign_tag(
    State(state): State<AppState>,
    Path((account_id, tagid)): Path<(i32, i64)>,
    Json(body): Json<OpenidsBody>,
) -> Response {
    match state.tags.unassign(account_id, &body.openids, tagid).await {
        Ok(removed) => (
            StatusCode::OK,
            Json(json!({"requested": body.openids.len(), "removed": removed})),
        )
            .into_response(),
        Err(e) => tag_error_response(e),
    }
}

/// Re-derive every cached tag count from the true relation count
pub async fn reconcile_tag_counts(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
) -> Response {
    match state.tags.reconcile_counts(account_id).await {
        Ok(corrected) => (StatusCode::OK, Json(json!({ "corrected": corrected }))).into_response(),
        Err(e) => tag_error_response(e),
    }
}
