// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use tracing::info;

use crate::db::{DbConnection, DbPool};
use crate::models::enums::FanStatus;
use crate::models::fan::Fan;
use crate::schema::{wechat_fan_tag_relations, wechat_fan_tags, wechat_fans};

/// One page of fans plus pagination metadata for the admin screens.
#[derive(Debug, Serialize)]
pub struct FanPage {
    pub fans: Vec<Fan>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub has_next: bool,
}

#[derive(Debug, Serialize)]
pub struct FanStatistics {
    pub subscribed: i64,
    pub unsubscribed: i64,
    pub blocked: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct FanExportRow {
    pub openid: String,
    pub nickname: Option<String>,
    pub status: FanStatus,
    pub tags: Vec<String>,
}

/// Read/annotate operations over the fan mirror used by the admin API.
/// Sync passes never go through here.
#[derive(Clone)]
pub struct FanManager {
    pool: DbPool,
}

impl FanManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow!("failed to get database connection: {e}"))
    }

    /// Apply the optional status/tag filters to an already-boxed query, so
    /// the same combination serves both the page load and the count.
    fn apply_filters<ST: 'static>(
        mut query: wechat_fans::BoxedQuery<'static, Pg, ST>,
        account_id: i32,
        status: Option<FanStatus>,
        tagid: Option<i64>,
    ) -> wechat_fans::BoxedQuery<'static, Pg, ST> {
        query = query.filter(wechat_fans::account_id.eq(account_id));

        if let Some(status) = status {
            query = query.filter(wechat_fans::status.eq(status));
        }

        if let Some(tagid) = tagid {
            let fan_ids = wechat_fan_tag_relations::table
                .inner_join(wechat_fan_tags::table)
                .filter(wechat_fan_tags::account_id.eq(account_id))
                .filter(wechat_fan_tags::tagid.eq(tagid))
                .select(wechat_fan_tag_relations::fan_id);
            query = query.filter(wechat_fans::id.eq_any(fan_ids));
        }

        query
    }

    fn filtered(
        account_id: i32,
        status: Option<FanStatus>,
        tagid: Option<i64>,
    ) -> wechat_fans::BoxedQuery<'static, Pg> {
        Self::apply_filters(wechat_fans::table.into_boxed(), account_id, status, tagid)
    }

    fn filtered_count(
        account_id: i32,
        status: Option<FanStatus>,
        tagid: Option<i64>,
    ) -> wechat_fans::BoxedQuery<'static, Pg, diesel::sql_types::BigInt> {
        Self::apply_filters(
            wechat_fans::table.count().into_boxed(),
            account_id,
            status,
            tagid,
        )
    }

    /// Paginated fan listing, newest subscription first, optionally
    /// filtered by status and/or tag.
    pub async fn list(
        &self,
        account_id: i32,
        page: i64,
        limit: i64,
        status: Option<FanStatus>,
        tagid: Option<i64>,
    ) -> Result<FanPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut conn = self.conn().await?;

        let total: i64 = Self::filtered_count(account_id, status, tagid)
            .get_result(&mut conn)
            .await?;

        let fans = Self::filtered(account_id, status, tagid)
            .order(wechat_fans::subscribe_time.desc().nulls_last())
            .limit(limit)
            .offset(offset)
            .load::<Fan>(&mut conn)
            .await?;

        Ok(FanPage {
            fans,
            total,
            page,
            limit,
            has_next: total > offset + limit,
        })
    }

    pub async fn get(&self, account_id: i32, openid: &str) -> Result<Option<Fan>> {
        let mut conn = self.conn().await?;

        let fan = wechat_fans::table
            .filter(wechat_fans::account_id.eq(account_id))
            .filter(wechat_fans::openid.eq(openid))
            .select(Fan::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(fan)
    }

    pub async fn statistics(&self, account_id: i32) -> Result<FanStatistics> {
        let mut conn = self.conn().await?;

        let mut counts = [0i64; 3];
        for (slot, status) in counts.iter_mut().zip([
            FanStatus::Subscribed,
            FanStatus::Unsubscribed,
            FanStatus::Blocked,
        ]) {
            *slot = wechat_fans::table
                .filter(wechat_fans::account_id.eq(account_id))
                .filter(wechat_fans::status.eq(status))
                .count()
                .get_result(&mut conn)
                .await?;
        }

        Ok(FanStatistics {
            subscribed: counts[0],
            unsubscribed: counts[1],
            blocked: counts[2],
            total: counts.iter().sum(),
        })
    }

    /// Update the free-text remark of one fan. Returns false when the fan
    /// is unknown.
    pub async fn update_remark(&self, account_id: i32, openid: &str, remark: &str) -> Result<bool> {
        let mut conn = self.conn().await?;

        let affected = diesel::update(
            wechat_fans::table
                .filter(wechat_fans::account_id.eq(account_id))
                .filter(wechat_fans::openid.eq(openid)),
        )
        .set((
            wechat_fans::remark.eq(remark),
            wechat_fans::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await?;

        if affected > 0 {
            info!(account = account_id, openid, remark, "updated fan remark");
        }

        Ok(affected > 0)
    }

    /// Flat export of fans with their tag names, optionally filtered by
    /// status.
    pub async fn export(
        &self,
        account_id: i32,
        status: Option<FanStatus>,
    ) -> Result<Vec<FanExportRow>> {
        let mut conn = self.conn().await?;

        let fans: Vec<Fan> = Self::filtered(account_id, status, None)
            .order(wechat_fans::subscribe_time.desc().nulls_last())
            .load(&mut conn)
            .await?;

        let tag_names: Vec<(i32, String)> = wechat_fan_tag_relations::table
            .inner_join(wechat_fan_tags::table)
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .select((wechat_fan_tag_relations::fan_id, wechat_fan_tags::name))
            .load(&mut conn)
            .await?;

        let mut tags_by_fan: HashMap<i32, Vec<String>> = HashMap::new();
        for (fan_id, name) in tag_names {
            tags_by_fan.entry(fan_id).or_default().push(name);
        }

        Ok(fans
            .into_iter()
            .map(|fan| FanExportRow {
                tags: tags_by_fan.remove(&fan.id).unwrap_or_default(),
                openid: fan.openid,
                nickname: fan.nickname,
                status: fan.status,
            })
            .collect())
    }
}
