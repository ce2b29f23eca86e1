// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;
use tracing::error;

use crate::api::AppState;
use crate::models::account::WechatAccount;
use crate::schema::wechat_accounts;

/// List all configured official accounts
pub async fn get_accounts(State(state): State<AppState>) -> impl IntoResponse {
    let mut conn = match state.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Database connection error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Database error: {}", e)})),
            );
        }
    };

    match wechat_accounts::table
        .order(wechat_accounts::id.asc())
        .select(WechatAccount::as_select())
        .load::<WechatAccount>(&mut conn)
        .await
    {
        Ok(accounts) => (StatusCode::OK, Json(json!({ "accounts": accounts }))),
        Err(e) => {
            error!("Failed to load accounts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to load accounts: {}", e)})),
            )
        }
    }
}
