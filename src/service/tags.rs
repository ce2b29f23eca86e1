// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use chrono::Utc;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use tracing::info;

use crate::db::{DbConnection, DbPool};
use crate::error::TagError;
use crate::models::fan::Fan;
use crate::models::tag::{FanTag, NewFanTag, NewFanTagRelation};
use crate::schema::{wechat_fan_tag_relations, wechat_fan_tags, wechat_fans};

/// One tag with its true relation count (as opposed to the cached
/// `fan_count` display value).
#[derive(Debug, Serialize)]
pub struct TagStatistics {
    pub tagid: i64,
    pub name: String,
    pub fan_count: i64,
}

/// Local tag administration: CRUD, batch assignment and count
/// reconciliation. Domain mistakes surface as typed [`TagError`]s.
#[derive(Clone)]
pub struct TagManager {
    pool: DbPool,
}

impl TagManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<DbConnection, TagError> {
        self.pool
            .get()
            .await
            .map_err(|e| TagError::Connection(e.to_string()))
    }

    pub async fn list(&self, account_id: i32) -> Result<Vec<FanTag>, TagError> {
        let mut conn = self.conn().await?;

        let tags = wechat_fan_tags::table
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .order(wechat_fan_tags::tagid.asc())
            .select(FanTag::as_select())
            .load(&mut conn)
            .await?;

        Ok(tags)
    }

    pub async fn get(&self, account_id: i32, tagid: i64) -> Result<Option<FanTag>, TagError> {
        let mut conn = self.conn().await?;

        let tag = wechat_fan_tags::table
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .filter(wechat_fan_tags::tagid.eq(tagid))
            .select(FanTag::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(tag)
    }

    async fn find_by_name(
        &self,
        account_id: i32,
        name: &str,
    ) -> Result<Option<FanTag>, TagError> {
        let mut conn = self.conn().await?;

        let tag = wechat_fan_tags::table
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .filter(wechat_fan_tags::name.eq(name))
            .select(FanTag::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(tag)
    }

    /// Create a tag locally. The new tagid is the account's current
    /// maximum plus one; duplicate names are rejected.
    pub async fn create(&self, account_id: i32, name: &str) -> Result<FanTag, TagError> {
        if self.find_by_name(account_id, name).await?.is_some() {
            return Err(TagError::TagNameExists {
                name: name.to_string(),
            });
        }

        let mut conn = self.conn().await?;

        let max_tagid: Option<i64> = wechat_fan_tags::table
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .select(max(wechat_fan_tags::tagid))
            .first(&mut conn)
            .await?;
        let tagid = max_tagid.unwrap_or(0) + 1;

        let now = Utc::now();
        let tag: FanTag = diesel::insert_into(wechat_fan_tags::table)
            .values(&NewFanTag {
                account_id,
                tagid,
                name: name.to_string(),
                fan_count: 0,
                created_at: now,
                updated_at: now,
            })
            .get_result(&mut conn)
            .await?;

        info!(account = account_id, tagid, name, "created new tag");

        Ok(tag)
    }

    /// Rename a tag. Returns false for an unknown tagid; renaming onto
    /// another tag's name is rejected.
    pub async fn rename(
        &self,
        account_id: i32,
        tagid: i64,
        new_name: &str,
    ) -> Result<bool, TagError> {
        let Some(tag) = self.get(account_id, tagid).await? else {
            return Ok(false);
        };

        if let Some(conflict) = self.find_by_name(account_id, new_name).await? {
            if conflict.id != tag.id {
                return Err(TagError::TagNameExists {
                    name: new_name.to_string(),
                });
            }
        }

        let mut conn = self.conn().await?;
        diesel::update(wechat_fan_tags::table.find(tag.id))
            .set((
                wechat_fan_tags::name.eq(new_name),
                wechat_fan_tags::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;

        info!(
            account = account_id,
            tagid,
            old_name = %tag.name,
            new_name,
            "renamed tag"
        );

        Ok(true)
    }

    /// Delete a tag; its join rows cascade. Returns false for an unknown
    /// tagid.
    pub async fn delete(&self, account_id: i32, tagid: i64) -> Result<bool, TagError> {
        let mut conn = self.conn().await?;

        let affected = diesel::delete(
            wechat_fan_tags::table
                .filter(wechat_fan_tags::account_id.eq(account_id))
                .filter(wechat_fan_tags::tagid.eq(tagid)),
        )
        .execute(&mut conn)
        .await?;

        if affected > 0 {
            info!(account = account_id, tagid, "deleted tag");
        }

        Ok(affected > 0)
    }

    /// True relation counts per tag, largest first.
    pub async fn statistics(&self, account_id: i32) -> Result<Vec<TagStatistics>, TagError> {
        let tags = self.list(account_id).await?;
        let counts = self.relation_counts(account_id).await?;

        let mut stats: Vec<TagStatistics> = tags
            .into_iter()
            .map(|tag| TagStatistics {
                tagid: tag.tagid,
                name: tag.name,
                fan_count: counts.get(&tag.id).copied().unwrap_or(0),
            })
            .collect();
        stats.sort_by(|a, b| b.fan_count.cmp(&a.fan_count));

        Ok(stats)
    }

    pub async fn fans_by_tag(&self, account_id: i32, tagid: i64) -> Result<Vec<Fan>, TagError> {
        let Some(tag) = self.get(account_id, tagid).await? else {
            return Err(TagError::TagNotFound { tagid });
        };

        let mut conn = self.conn().await?;

        let fan_ids = wechat_fan_tag_relations::table
            .filter(wechat_fan_tag_relations::tag_id.eq(tag.id))
            .select(wechat_fan_tag_relations::fan_id);

        let fans = wechat_fans::table
            .filter(wechat_fans::id.eq_any(fan_ids))
            .order(wechat_fans::subscribe_time.desc().nulls_last())
            .select(Fan::as_select())
            .load(&mut conn)
            .await?;

        Ok(fans)
    }

    /// Assign a tag to the given openids. Unknown openids and already
    /// assigned pairs are skipped silently; the return value counts join
    /// rows actually created.
    pub async fn assign(
        &self,
        account_id: i32,
        openids: &[String],
        tagid: i64,
    ) -> Result<usize, TagError> {
        let Some(tag) = self.get(account_id, tagid).await? else {
            return Err(TagError::TagNotFound { tagid });
        };

        let mut conn = self.conn().await?;

        let fan_ids: Vec<i32> = wechat_fans::table
            .filter(wechat_fans::account_id.eq(account_id))
            .filter(wechat_fans::openid.eq_any(openids))
            .select(wechat_fans::id)
            .load(&mut conn)
            .await?;

        if fan_ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let rows: Vec<NewFanTagRelation> = fan_ids
            .into_iter()
            .map(|fan_id| NewFanTagRelation {
                fan_id,
                tag_id: tag.id,
                created_at: now,
            })
            .collect();

        let added = diesel::insert_into(wechat_fan_tag_relations::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;

        if added > 0 {
            info!(
                account = account_id,
                tagid,
                requested = openids.len(),
                added,
                "batch assigned tag to fans"
            );
        }

        Ok(added)
    }

    /// Remove a tag from the given openids; counts join rows actually
    /// deleted.
    pub async fn unassign(
        &self,
        account_id: i32,
        openids: &[String],
        tagid: i64,
    ) -> Result<usize, TagError> {
        let Some(tag) = self.get(account_id, tagid).await? else {
            return Err(TagError::TagNotFound { tagid });
        };

        let mut conn = self.conn().await?;

        let fan_ids = wechat_fans::table
            .filter(wechat_fans::account_id.eq(account_id))
            .filter(wechat_fans::openid.eq_any(openids))
            .select(wechat_fans::id);

        let removed = diesel::delete(
            wechat_fan_tag_relations::table
                .filter(wechat_fan_tag_relations::tag_id.eq(tag.id))
                .filter(wechat_fan_tag_relations::fan_id.eq_any(fan_ids)),
        )
        .execute(&mut conn)
        .await?;

        if removed > 0 {
            info!(
                account = account_id,
                tagid,
                requested = openids.len(),
                removed,
                "batch removed tag from fans"
            );
        }

        Ok(removed)
    }

    /// Re-derive the cached display count of every tag from the true
    /// relation count. Returns how many tags were corrected.
    pub async fn reconcile_counts(&self, account_id: i32) -> Result<usize, TagError> {
        let tags = self.list(account_id).await?;
        let counts = self.relation_counts(account_id).await?;

        let mut conn = self.conn().await?;
        let mut corrected = 0;
        for tag in tags {
            let actual = counts.get(&tag.id).copied().unwrap_or(0);
            if tag.fan_count != actual {
                diesel::update(wechat_fan_tags::table.find(tag.id))
                    .set((
                        wechat_fan_tags::fan_count.eq(actual),
                        wechat_fan_tags::updated_at.eq(Utc::now()),
                    ))
                    .execute(&mut conn)
                    .await?;
                corrected += 1;
            }
        }

        if corrected > 0 {
            info!(account = account_id, corrected, "reconciled cached tag counts");
        }

        Ok(corrected)
    }

    async fn relation_counts(&self, account_id: i32) -> Result<HashMap<i32, i64>, TagError> {
        let mut conn = self.conn().await?;

        let rows: Vec<(i32, i64)> = wechat_fan_tag_relations::table
            .inner_join(wechat_fan_tags::table)
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .group_by(wechat_fan_tag_relations::tag_id)
            .select((
                wechat_fan_tag_relations::tag_id,
                diesel::dsl::count_star(),
            ))
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().collect())
    }
}
