// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::api::AppState;
use crate::models::enums::FanStatus;

#[derive(Debug, Deserialize)]
pub struct FanListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub tag_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FanExportQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemarkBody {
    pub remark: String,
}

fn parse_status(raw: Option<&str>) -> Result<Option<FanStatus>, Response> {
    match raw {
        None => Ok(None),
        Some(value) => FanStatus::parse(value).map(Some).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("unknown status '{}'", value)})),
            )
                .into_response()
        }),
    }
}

/// Paginated fan listing, filterable by status and tag
pub async fn get_fans(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
    Query(query): Query<FanListQuery>,
) -> Response {
    let status = match parse_status(query.status.as_deref()) {
        Ok(status) => status,
        Err(response) => return response,
    };

    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);

    match state
        .fans
        .list(account_id, page, limit, status, query.tag_id)
        .await
    {
        Ok(page) => (
            StatusCode::OK,
            Json(json!({
                "fans": page.fans,
                "total": page.total,
                "page": page.page,
                "limit": page.limit,
                "has_next": page.has_next,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to list fans: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to list fans: {}", e)})),
            )
                .into_response()
        }
    }
}

/// Single fan lookup by openid
pub async fn get_fan(
    State(state): State<AppState>,
    Path((account_id, openid)): Path<(i32, String)>,
) -> Response {
    match state.fans.get(account_id, &openid).await {
        Ok(Some(fan)) => (StatusCode::OK, Json(json!({ "fan": fan }))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Fan not found"})),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to load fan: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to load fan: {}", e)})),
            )
                .into_response()
        }
    }
}

/// Per-status fan counts
pub async fn get_fan_statistics(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
) -> Response {
    match state.fans.statistics(account_id).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => {
            error!("Failed to compute fan statistics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to compute statistics: {}", e)})),
            )
                .into_response()
        }
    }
}

/// Update the free-text remark of one fan
pub async fn update_remark(
    State(state): State<AppState>,
    Path((account_id, openid)): Path<(i32, String)>,
    Json(body): Json<RemarkBody>,
) -> Response {
    match state
        .fans
        .update_remark(account_id, &openid, &body.remark)
        .await
    {
        Ok(true) => (StatusCode::OK, Json(json!({"updated": true}))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Fan not found"})),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to update remark: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to update remark: {}", e)})),
            )
                .into_response()
        }
    }
}

/// Flat export of fans with their tag names
pub async fn export_fans(
    State(state): State<AppState>,
    Path(account_id): Path<i32>,
    Query(query): Query<FanExportQuery>,
) -> Response {
    let status = match parse_status(query.status.as_deref()) {
        Ok(status) => status,
        Err(response) => return response,
    };

    match state.fans.export(account_id, status).await {
        Ok(rows) => (StatusCode::OK, Json(json!({ "fans": rows }))).into_response(),
        Err(e) => {
            error!("Failed to export fans: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to export fans: {}", e)})),
            )
                .into_response()
        }
    }
}
