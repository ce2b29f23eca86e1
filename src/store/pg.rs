use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::db::{DbConnection, DbPool};
use crate::models::enums::FanStatus;
use crate::models::fan::NewFan;
use crate::models::tag::NewFanTag;
use crate::schema::{wechat_fan_tags, wechat_fans};
use crate::store::{FanDetailUpdate, MemberSnapshot, MirrorStore, TagSnapshot};
use crate::wechat::RemoteTag;

/// Postgres-backed mirror store. Holds the shared pool; every mutating
/// method runs inside one transaction.
#[derive(Clone)]
pub struct PgMirrorStore {
    pool: DbPool,
}

impl PgMirrorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow!("failed to get database connection: {e}"))
    }
}

#[async_trait]
impl MirrorStore for PgMirrorStore {
    async fn find_members(
        &self,
        account_id: i32,
        openids: &[String],
    ) -> Result<Vec<MemberSnapshot>> {
        let mut conn = self.conn().await?;

        let rows: Vec<(String, FanStatus)> = wechat_fans::table
            .filter(wechat_fans::account_id.eq(account_id))
            .filter(wechat_fans::openid.eq_any(openids))
            .select((wechat_fans::openid, wechat_fans::status))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(openid, status)| MemberSnapshot { openid, status })
            .collect())
    }

    async fn upsert_member_statuses(
        &self,
        account_id: i32,
        status: FanStatus,
        create: &[String],
        transition: &[String],
    ) -> Result<()> {
        if create.is_empty() && transition.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let now = Utc::now();
        let rows: Vec<NewFan> = create
            .iter()
            .map(|openid| NewFan::observed(account_id, openid, status))
            .collect();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                if !rows.is_empty() {
                    diesel::insert_into(wechat_fans::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;
                }
                if !transition.is_empty() {
                    diesel::update(
                        wechat_fans::table
                            .filter(wechat_fans::account_id.eq(account_id))
                            .filter(wechat_fans::openid.eq_any(transition)),
                    )
                    .set((
                        wechat_fans::status.eq(status),
                        wechat_fans::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(())
    }

    async fn bulk_transition_status(
        &self,
        account_id: i32,
        from: FanStatus,
        to: FanStatus,
        keep_openids: &[String],
    ) -> Result<u64> {
        let mut conn = self.conn().await?;
        let now = Utc::now();

        // The whole external set is bounded by the in-memory constraint, so
        // a single NOT IN over it is the complement in one statement.
        let affected = if keep_openids.is_empty() {
            diesel::update(
                wechat_fans::table
                    .filter(wechat_fans::account_id.eq(account_id))
                    .filter(wechat_fans::status.eq(from)),
            )
            .set((wechat_fans::status.eq(to), wechat_fans::updated_at.eq(now)))
            .execute(&mut conn)
            .await?
        } else {
            diesel::update(
                wechat_fans::table
                    .filter(wechat_fans::account_id.eq(account_id))
                    .filter(wechat_fans::status.eq(from))
                    .filter(wechat_fans::openid.ne_all(keep_openids)),
            )
            .set((wechat_fans::status.eq(to), wechat_fans::updated_at.eq(now)))
            .execute(&mut conn)
            .await?
        };

        Ok(affected as u64)
    }

    async fn subscribed_openids(&self, account_id: i32) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;

        let openids = wechat_fans::table
            .filter(wechat_fans::account_id.eq(account_id))
            .filter(wechat_fans::status.eq(FanStatus::Subscribed))
            .order(wechat_fans::id.asc())
            .select(wechat_fans::openid)
            .load(&mut conn)
            .await?;

        Ok(openids)
    }

    async fn apply_detail_updates(
        &self,
        account_id: i32,
        updates: &[FanDetailUpdate],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let now = Utc::now();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                for update in updates {
                    if update.changes.is_empty() {
                        continue;
                    }
                    let mut changes = update.changes.clone();
                    changes.updated_at = Some(now);

                    diesel::update(
                        wechat_fans::table
                            .filter(wechat_fans::account_id.eq(account_id))
                            .filter(wechat_fans::openid.eq(&update.openid)),
                    )
                    .set(&changes)
                    .execute(conn)
                    .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(())
    }

    async fn find_tags(&self, account_id: i32) -> Result<Vec<TagSnapshot>> {
        let mut conn = self.conn().await?;

        let rows: Vec<(i64, String, i64)> = wechat_fan_tags::table
            .filter(wechat_fan_tags::account_id.eq(account_id))
            .select((
                wechat_fan_tags::tagid,
                wechat_fan_tags::name,
                wechat_fan_tags::fan_count,
            ))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(tagid, name, fan_count)| TagSnapshot {
                tagid,
                name,
                fan_count,
            })
            .collect())
    }

    async fn replace_tags(
        &self,
        account_id: i32,
        upserts: &[RemoteTag],
        delete_tagids: &[i64],
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let now = Utc::now();
        let rows: Vec<NewFanTag> = upserts
            .iter()
            .map(|tag| NewFanTag {
                account_id,
                tagid: tag.id,
                name: tag.name.clone(),
                fan_count: tag.count,
                created_at: now,
                updated_at: now,
            })
            .collect();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                if !rows.is_empty() {
                    diesel::insert_into(wechat_fan_tags::table)
                        .values(&rows)
                        .on_conflict((wechat_fan_tags::account_id, wechat_fan_tags::tagid))
                        .do_update()
                        .set((
                            wechat_fan_tags::name.eq(excluded(wechat_fan_tags::name)),
                            wechat_fan_tags::fan_count.eq(excluded(wechat_fan_tags::fan_count)),
                            wechat_fan_tags::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                }
                if !delete_tagids.is_empty() {
                    diesel::delete(
                        wechat_fan_tags::table
                            .filter(wechat_fan_tags::account_id.eq(account_id))
                            .filter(wechat_fan_tags::tagid.eq_any(delete_tagids)),
                    )
                    .execute(conn)
                    .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(())
    }
}
