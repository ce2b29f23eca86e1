// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::models::account::WechatAccount;
use crate::schema::wechat_accounts;
use crate::store::{MirrorStore, PgMirrorStore};
use crate::sync::engine::{ListKind, SyncEngine, SyncOptions};
use crate::wechat::{DirectoryClient, WeChatClient};

/// The four reconciliation jobs, each runnable on its daily slot or on
/// demand through the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncJob {
    Tags,
    Followers,
    UserDetails,
    Blacklist,
}

impl SyncJob {
    pub const ALL: [SyncJob; 4] = [
        SyncJob::Tags,
        SyncJob::Followers,
        SyncJob::UserDetails,
        SyncJob::Blacklist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJob::Tags => "tags",
            SyncJob::Followers => "followers",
            SyncJob::UserDetails => "user-details",
            SyncJob::Blacklist => "blacklist",
        }
    }

    pub fn parse(value: &str) -> Option<SyncJob> {
        match value {
            "tags" => Some(SyncJob::Tags),
            "followers" => Some(SyncJob::Followers),
            "user-details" => Some(SyncJob::UserDetails),
            "blacklist" => Some(SyncJob::Blacklist),
            _ => None,
        }
    }
}

impl fmt::Display for SyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the production engine wiring and drives jobs across all active
/// accounts, strictly one account at a time.
pub struct SyncRuntime {
    db: Arc<Database>,
    client: Arc<WeChatClient>,
    store: PgMirrorStore,
    engine: SyncEngine<Arc<WeChatClient>, PgMirrorStore>,
}

impl SyncRuntime {
    pub fn new(db: Arc<Database>, client: WeChatClient, options: SyncOptions) -> Self {
        let client = Arc::new(client);
        let store = PgMirrorStore::new(db.get_pool().clone());
        let engine = SyncEngine::new(client.clone(), store.clone(), options);
        Self {
            db,
            client,
            store,
            engine,
        }
    }

    /// Run one job for every active account. A failing account is logged
    /// and skipped; the job itself only fails when the account list cannot
    /// be loaded at all.
    pub async fn run(&self, job: SyncJob) -> Result<()> {
        let accounts = self.active_accounts().await?;
        info!(job = %job, accounts = accounts.len(), "starting sync job");

        for account in &accounts {
            if let Err(e) = self.run_for_account(job, account).await {
                error!(
                    job = %job,
                    account = account.id,
                    error = ?e,
                    "sync failed for account"
                );
            }
        }

        Ok(())
    }

    async fn run_for_account(&self, job: SyncJob, account: &WechatAccount) -> Result<()> {
        match job {
            SyncJob::Followers => {
                info!(account = account.id, "starting follower list sync");
                let report = self
                    .engine
                    .sync_full_list(account, ListKind::Followers)
                    .await?;
                info!(
                    account = account.id,
                    total_followers = report.fetched,
                    created = report.created,
                    transitioned = report.transitioned,
                    displaced = report.displaced,
                    "follower list sync finished"
                );
            }
            SyncJob::Blacklist => {
                info!(account = account.id, "starting blacklist sync");
                let report = self
                    .engine
                    .sync_full_list(account, ListKind::Blacklist)
                    .await?;
                info!(
                    account = account.id,
                    blacklisted = report.fetched,
                    created = report.created,
                    transitioned = report.transitioned,
                    displaced = report.displaced,
                    "blacklist sync finished"
                );
            }
            SyncJob::Tags => {
                info!(account = account.id, "starting tag list sync");
                let Some(tags) = self.client.tag_list(account).await? else {
                    warn!(
                        account = account.id,
                        "tag list response carried no tags, skipping account"
                    );
                    return Ok(());
                };
                let report = self.engine.sync_tag_definitions(account, &tags).await?;
                info!(
                    account = account.id,
                    total_tags = report.total,
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    "tag list sync finished"
                );
            }
            SyncJob::UserDetails => {
                let candidates = self.store.subscribed_openids(account.id).await?;
                if candidates.is_empty() {
                    info!(account = account.id, "no subscribed members to enrich");
                    return Ok(());
                }
                info!(
                    account = account.id,
                    candidates = candidates.len(),
                    "starting user detail sync"
                );
                let report = self.engine.sync_user_details(account, &candidates).await?;
                info!(
                    account = account.id,
                    total = report.total,
                    processed = report.processed,
                    errors = report.errors,
                    success_rate = %format!("{:.2}%", report.success_rate()),
                    "user detail sync finished"
                );
            }
        }

        Ok(())
    }

    async fn active_accounts(&self) -> Result<Vec<WechatAccount>> {
        let mut conn = self.db.get_connection().await?;

        let accounts = wechat_accounts::table
            .filter(wechat_accounts::active.eq(true))
            .order(wechat_accounts::id.asc())
            .select(WechatAccount::as_select())
            .load(&mut conn)
            .await?;

        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_names_round_trip() {
        for job in SyncJob::ALL {
            assert_eq!(SyncJob::parse(job.as_str()), Some(job));
        }
        assert_eq!(SyncJob::parse("everything"), None);
    }
}
