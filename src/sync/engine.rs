// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::models::account::WechatAccount;
use crate::models::enums::{FanStatus, Gender};
use crate::models::fan::FanDetailChangeset;
use crate::store::{FanDetailUpdate, MirrorStore};
use crate::wechat::{DirectoryClient, RemoteTag};

/// Which external full list a reconciliation pass mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Followers,
    Blacklist,
}

impl ListKind {
    /// Status asserted for every id present in the fetched list.
    pub fn target_status(&self) -> FanStatus {
        match self {
            ListKind::Followers => FanStatus::Subscribed,
            ListKind::Blacklist => FanStatus::Blocked,
        }
    }

    /// Status displaced by this pass: members currently carrying it whose
    /// id is absent from the fetched list drop to `Unsubscribed`.
    pub fn displaced_status(&self) -> FanStatus {
        match self {
            ListKind::Followers => FanStatus::Subscribed,
            ListKind::Blacklist => FanStatus::Blocked,
        }
    }

    /// Whether a member currently in `current` may be moved to this pass's
    /// target status. Blacklist membership wins: the follower list never
    /// reclaims a blocked member; only a blacklist pass that no longer
    /// carries the id releases them.
    pub fn may_transition_from(&self, current: FanStatus) -> bool {
        match self {
            ListKind::Followers => current != FanStatus::Blocked,
            ListKind::Blacklist => true,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Followers => f.write_str("followers"),
            ListKind::Blacklist => f.write_str("blacklist"),
        }
    }
}

/// Fetch anomalies that abort one account's pass without touching the
/// mirror. Anything else bubbles up as a plain error.
#[derive(Debug, Error)]
pub enum SyncAnomaly {
    #[error("directory returned a malformed {kind} page")]
    MalformedPage { kind: ListKind },
}

/// Batching and pacing knobs, taken from configuration in production and
/// shrunk to zero delays in tests.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub list_page_delay: Duration,
    pub detail_batch_delay: Duration,
    pub list_batch_size: usize,
    pub detail_batch_size: usize,
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            list_page_delay: Duration::from_millis(config.list_page_delay_ms),
            detail_batch_delay: Duration::from_millis(config.detail_batch_delay_ms),
            list_batch_size: config.list_batch_size.max(1),
            detail_batch_size: config.detail_batch_size.max(1),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            list_page_delay: Duration::from_millis(100),
            detail_batch_delay: Duration::from_millis(200),
            list_batch_size: 100,
            detail_batch_size: 80,
        }
    }
}

/// Outcome of one full-list pass, for the caller's log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListSyncReport {
    /// Distinct ids accumulated across all pages.
    pub fetched: usize,
    /// Members created because the id had never been observed.
    pub created: usize,
    /// Existing members moved to the target status.
    pub transitioned: usize,
    /// Members displaced to `Unsubscribed` because their id vanished.
    pub displaced: u64,
}

/// Outcome of one tag full-replace pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TagSyncReport {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Outcome of one detail-enrichment pass. A failed batch counts every
/// member in that batch as failed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetailSyncReport {
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
}

impl DetailSyncReport {
    /// Success rate in percent. Callers keep `total == 0` out of here.
    pub fn success_rate(&self) -> f64 {
        (self.processed as f64 / self.total as f64) * 100.0
    }
}

/// The reconciliation engine: fetches a full external set through the
/// directory client, diffs it against the local mirror and applies the
/// difference in bounded batches. One instance serves every account; all
/// collaborators are injected.
pub struct SyncEngine<C, S> {
    client: C,
    store: S,
    options: SyncOptions,
}

impl<C: DirectoryClient, S: MirrorStore> SyncEngine<C, S> {
    pub fn new(client: C, store: S, options: SyncOptions) -> Self {
        Self {
            client,
            store,
            options,
        }
    }

    /// Mirror one full external list (followers or blacklist) for one
    /// account: every fetched id ends up in the list's target status, and
    /// every member left behind in the displaced status drops to
    /// `Unsubscribed`. Fetching happens entirely before the first write,
    /// so an aborted fetch leaves the mirror untouched.
    pub async fn sync_full_list(
        &self,
        account: &WechatAccount,
        kind: ListKind,
    ) -> Result<ListSyncReport> {
        let openids = self.fetch_full_list(account, kind).await?;
        let target = kind.target_status();
        let mut report = ListSyncReport {
            fetched: openids.len(),
            ..Default::default()
        };

        for chunk in openids.chunks(self.options.list_batch_size) {
            let existing: HashMap<String, FanStatus> = self
                .store
                .find_members(account.id, chunk)
                .await?
                .into_iter()
                .map(|m| (m.openid, m.status))
                .collect();

            let mut create = Vec::new();
            let mut transition = Vec::new();
            for openid in chunk {
                match existing.get(openid) {
                    None => create.push(openid.clone()),
                    Some(current) if *current == target => {}
                    Some(current) if kind.may_transition_from(*current) => {
                        transition.push(openid.clone())
                    }
                    Some(current) => {
                        debug!(
                            account = account.id,
                            openid = %openid,
                            current = %current,
                            kind = %kind,
                            "leaving member untouched"
                        );
                    }
                }
            }

            report.created += create.len();
            report.transitioned += transition.len();
            self.store
                .upsert_member_statuses(account.id, target, &create, &transition)
                .await?;
        }

        // Complement transition as one set operation over the whole
        // accumulated id list; an empty list means the displaced status is
        // cleared unconditionally.
        report.displaced = self
            .store
            .bulk_transition_status(
                account.id,
                kind.displaced_status(),
                FanStatus::Unsubscribed,
                &openids,
            )
            .await?;

        Ok(report)
    }

    /// Pull every page of the list, deduplicating while preserving order.
    async fn fetch_full_list(
        &self,
        account: &WechatAccount,
        kind: ListKind,
    ) -> Result<Vec<String>> {
        let mut accumulated: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut first_page = true;

        loop {
            let page = match kind {
                ListKind::Followers => {
                    self.client.follower_page(account, cursor.as_deref()).await?
                }
                ListKind::Blacklist => {
                    self.client.blacklist_page(account, cursor.as_deref()).await?
                }
            };

            match page.openids() {
                Some(ids) => {
                    for id in ids {
                        if seen.insert(id.clone()) {
                            accumulated.push(id.clone());
                        }
                    }
                }
                None if first_page && page.reports_zero_total() => {
                    info!(account = account.id, kind = %kind, "directory reports an empty list");
                    return Ok(Vec::new());
                }
                // Trailing page past the last id: pagination is done.
                None if !first_page && page.is_drained() => break,
                None => {
                    warn!(
                        account = account.id,
                        kind = %kind,
                        "malformed list page, aborting this account's pass"
                    );
                    return Err(SyncAnomaly::MalformedPage { kind }.into());
                }
            }

            debug!(
                account = account.id,
                kind = %kind,
                accumulated = accumulated.len(),
                has_next = page.next_cursor().is_some(),
                "fetched list page"
            );

            cursor = page.next_cursor().map(str::to_string);
            if cursor.is_none() {
                break;
            }
            first_page = false;
            sleep(self.options.list_page_delay).await;
        }

        Ok(accumulated)
    }

    /// Make the local tag set exactly mirror the directory's: update or
    /// create every remote tag, delete every local tag the response no
    /// longer carries. All mutations land in one commit.
    pub async fn sync_tag_definitions(
        &self,
        account: &WechatAccount,
        remote_tags: &[RemoteTag],
    ) -> Result<TagSyncReport> {
        let existing = self.store.find_tags(account.id).await?;
        let existing_ids: HashSet<i64> = existing.iter().map(|t| t.tagid).collect();
        let remote_ids: HashSet<i64> = remote_tags.iter().map(|t| t.id).collect();

        let mut report = TagSyncReport {
            total: remote_tags.len(),
            ..Default::default()
        };
        for tag in remote_tags {
            if existing_ids.contains(&tag.id) {
                report.updated += 1;
            } else {
                report.created += 1;
            }
        }

        let mut stale = Vec::new();
        for tag in &existing {
            if !remote_ids.contains(&tag.tagid) {
                info!(
                    account = account.id,
                    tagid = tag.tagid,
                    name = %tag.name,
                    "removing tag no longer present in the directory"
                );
                stale.push(tag.tagid);
            }
        }
        report.deleted = stale.len();

        self.store
            .replace_tags(account.id, remote_tags, &stale)
            .await?;

        Ok(report)
    }

    /// Enrich subscribed members with their directory profile, batch by
    /// batch. Callers pre-filter to subscribed members and keep an empty
    /// candidate set out of here.
    pub async fn sync_user_details(
        &self,
        account: &WechatAccount,
        openids: &[String],
    ) -> Result<DetailSyncReport> {
        let mut report = DetailSyncReport {
            total: openids.len(),
            ..Default::default()
        };
        let batches: Vec<&[String]> = openids.chunks(self.options.detail_batch_size).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            match self.process_detail_batch(account, batch).await {
                Ok(processed) => {
                    report.processed += processed;
                    debug!(
                        account = account.id,
                        batch = index + 1,
                        batch_size = batch.len(),
                        processed,
                        "detail batch applied"
                    );
                }
                // No retry: the whole batch counts as failed and the pass
                // moves on to the next one.
                Err(e) => {
                    warn!(
                        account = account.id,
                        batch = index + 1,
                        error = %e,
                        "detail batch failed"
                    );
                    report.errors += batch.len();
                }
            }

            if index + 1 < batch_count {
                sleep(self.options.detail_batch_delay).await;
            }
        }

        Ok(report)
    }

    async fn process_detail_batch(
        &self,
        account: &WechatAccount,
        batch: &[String],
    ) -> Result<usize> {
        let records = self
            .client
            .user_detail_batch(account, batch)
            .await?
            .ok_or_else(|| anyhow!("detail response carried no record list"))?;

        let wanted: HashSet<&str> = batch.iter().map(String::as_str).collect();
        let mut updates = Vec::new();
        for record in &records {
            // A record without a usable openid is skipped, but does not
            // fail the batch.
            let Some(openid) = record.get("openid").and_then(Value::as_str) else {
                continue;
            };
            if !wanted.contains(openid) {
                continue;
            }

            let changes = detail_changes(record);
            if changes.status == Some(FanStatus::Unsubscribed) {
                warn!(
                    account = account.id,
                    openid, "member reported as no longer subscribed"
                );
            }
            updates.push(FanDetailUpdate {
                openid: openid.to_string(),
                changes,
            });
        }

        self.store
            .apply_detail_updates(account.id, &updates)
            .await?;

        Ok(updates.len())
    }
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Map one raw detail record to a field-level changeset. Every field is
/// taken independently: absent or mistyped values leave their column
/// untouched without affecting the others.
pub(crate) fn detail_changes(record: &Value) -> FanDetailChangeset {
    let mut changes = FanDetailChangeset {
        unionid: string_field(record, "unionid"),
        nickname: string_field(record, "nickname"),
        avatar_url: string_field(record, "headimgurl"),
        language: string_field(record, "language"),
        city: string_field(record, "city"),
        province: string_field(record, "province"),
        country: string_field(record, "country"),
        remark: string_field(record, "remark"),
        ..Default::default()
    };

    // The directory reports sex as an integer or a numeric string.
    changes.gender = match record.get("sex") {
        Some(Value::Number(n)) => n.as_i64().map(Gender::from_code),
        Some(Value::String(s)) => s.parse::<i64>().ok().map(Gender::from_code),
        _ => None,
    };

    if let Some(ts) = record.get("subscribe_time").and_then(Value::as_i64) {
        if ts > 0 {
            changes.subscribe_time = DateTime::<Utc>::from_timestamp(ts, 0);
        }
    }

    // An explicit subscribe=0 overrides the subscribed precondition.
    if record.get("subscribe").and_then(Value::as_i64) == Some(0) {
        changes.status = Some(FanStatus::Unsubscribed);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemberSnapshot, TagSnapshot};
    use crate::wechat::MemberListPage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn account() -> WechatAccount {
        WechatAccount {
            id: 1,
            name: "main".into(),
            app_id: "wx0123".into(),
            app_secret: "secret".into(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fast_options() -> SyncOptions {
        SyncOptions {
            list_page_delay: Duration::ZERO,
            detail_batch_delay: Duration::ZERO,
            ..SyncOptions::default()
        }
    }

    enum DetailReply {
        Records(Vec<Value>),
        Missing,
        Fail,
    }

    #[derive(Default)]
    struct FakeDirectory {
        follower_pages: Vec<MemberListPage>,
        blacklist_pages: Vec<MemberListPage>,
        follower_calls: AtomicUsize,
        blacklist_calls: AtomicUsize,
        detail_replies: Vec<DetailReply>,
        detail_calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn with_follower_pages(pages: Vec<MemberListPage>) -> Self {
            Self {
                follower_pages: pages,
                ..Default::default()
            }
        }

        fn with_blacklist_pages(pages: Vec<MemberListPage>) -> Self {
            Self {
                blacklist_pages: pages,
                ..Default::default()
            }
        }

        fn with_detail_replies(replies: Vec<DetailReply>) -> Self {
            Self {
                detail_replies: replies,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn follower_page(
            &self,
            _account: &WechatAccount,
            _cursor: Option<&str>,
        ) -> Result<MemberListPage> {
            // Wraps around so an idempotence test can run the pass twice.
            let i = self.follower_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.follower_pages[i % self.follower_pages.len()].clone())
        }

        async fn blacklist_page(
            &self,
            _account: &WechatAccount,
            _cursor: Option<&str>,
        ) -> Result<MemberListPage> {
            let i = self.blacklist_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.blacklist_pages[i % self.blacklist_pages.len()].clone())
        }

        async fn tag_list(&self, _account: &WechatAccount) -> Result<Option<Vec<RemoteTag>>> {
            Ok(None)
        }

        async fn user_detail_batch(
            &self,
            _account: &WechatAccount,
            _openids: &[String],
        ) -> Result<Option<Vec<Value>>> {
            let i = self.detail_calls.fetch_add(1, Ordering::SeqCst);
            match self.detail_replies.get(i) {
                Some(DetailReply::Records(records)) => Ok(Some(records.clone())),
                Some(DetailReply::Missing) => Ok(None),
                Some(DetailReply::Fail) => Err(anyhow!("connection reset")),
                None => Ok(Some(Vec::new())),
            }
        }
    }

    #[derive(Default)]
    struct FakeStore {
        members: Mutex<HashMap<String, FanStatus>>,
        tags: Mutex<HashMap<i64, TagSnapshot>>,
        applied: Mutex<Vec<FanDetailUpdate>>,
        status_writes: AtomicUsize,
        bulk_calls: AtomicUsize,
    }

    impl FakeStore {
        fn with_members(entries: &[(&str, FanStatus)]) -> Self {
            let store = Self::default();
            {
                let mut members = store.members.lock().unwrap();
                for (openid, status) in entries {
                    members.insert(openid.to_string(), *status);
                }
            }
            store
        }

        fn status_of(&self, openid: &str) -> Option<FanStatus> {
            self.members.lock().unwrap().get(openid).copied()
        }
    }

    #[async_trait]
    impl MirrorStore for FakeStore {
        async fn find_members(
            &self,
            _account_id: i32,
            openids: &[String],
        ) -> Result<Vec<MemberSnapshot>> {
            let members = self.members.lock().unwrap();
            Ok(openids
                .iter()
                .filter_map(|openid| {
                    members.get(openid).map(|status| MemberSnapshot {
                        openid: openid.clone(),
                        status: *status,
                    })
                })
                .collect())
        }

        async fn upsert_member_statuses(
            &self,
            _account_id: i32,
            status: FanStatus,
            create: &[String],
            transition: &[String],
        ) -> Result<()> {
            let mut members = self.members.lock().unwrap();
            for openid in create.iter().chain(transition) {
                members.insert(openid.clone(), status);
            }
            self.status_writes
                .fetch_add(create.len() + transition.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn bulk_transition_status(
            &self,
            _account_id: i32,
            from: FanStatus,
            to: FanStatus,
            keep_openids: &[String],
        ) -> Result<u64> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            let keep: HashSet<&str> = keep_openids.iter().map(String::as_str).collect();
            let mut members = self.members.lock().unwrap();
            let mut changed = 0;
            for (openid, status) in members.iter_mut() {
                if *status == from && !keep.contains(openid.as_str()) {
                    *status = to;
                    changed += 1;
                }
            }
            Ok(changed)
        }

        async fn subscribed_openids(&self, _account_id: i32) -> Result<Vec<String>> {
            let members = self.members.lock().unwrap();
            let mut openids: Vec<String> = members
                .iter()
                .filter(|(_, status)| **status == FanStatus::Subscribed)
                .map(|(openid, _)| openid.clone())
                .collect();
            openids.sort();
            Ok(openids)
        }

        async fn apply_detail_updates(
            &self,
            _account_id: i32,
            updates: &[FanDetailUpdate],
        ) -> Result<()> {
            let mut members = self.members.lock().unwrap();
            for update in updates {
                if let Some(status) = update.changes.status {
                    members.insert(update.openid.clone(), status);
                }
            }
            self.applied.lock().unwrap().extend_from_slice(updates);
            Ok(())
        }

        async fn find_tags(&self, _account_id: i32) -> Result<Vec<TagSnapshot>> {
            let tags = self.tags.lock().unwrap();
            let mut all: Vec<TagSnapshot> = tags.values().cloned().collect();
            all.sort_by_key(|t| t.tagid);
            Ok(all)
        }

        async fn replace_tags(
            &self,
            _account_id: i32,
            upserts: &[RemoteTag],
            delete_tagids: &[i64],
        ) -> Result<()> {
            let mut tags = self.tags.lock().unwrap();
            for tag in upserts {
                tags.insert(
                    tag.id,
                    TagSnapshot {
                        tagid: tag.id,
                        name: tag.name.clone(),
                        fan_count: tag.count,
                    },
                );
            }
            for tagid in delete_tagids {
                tags.remove(tagid);
            }
            Ok(())
        }
    }

    #[test_log::test(tokio::test)]
    async fn follower_sync_asserts_target_and_displaces_vanished_members() {
        let directory = FakeDirectory::with_follower_pages(vec![
            MemberListPage::with_ids(&["A", "B"], Some("B"), 3),
            MemberListPage::with_ids(&["C"], None, 3),
        ]);
        let store = FakeStore::with_members(&[
            ("A", FanStatus::Blocked),
            ("B", FanStatus::Unsubscribed),
            ("D", FanStatus::Subscribed),
            ("E", FanStatus::Unsubscribed),
        ]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_full_list(&account(), ListKind::Followers)
            .await
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.created, 1); // C
        assert_eq!(report.transitioned, 1); // B
        assert_eq!(report.displaced, 1); // D

        // A blocked member in the follower list stays blocked.
        assert_eq!(engine.store.status_of("A"), Some(FanStatus::Blocked));
        assert_eq!(engine.store.status_of("B"), Some(FanStatus::Subscribed));
        assert_eq!(engine.store.status_of("C"), Some(FanStatus::Subscribed));
        assert_eq!(engine.store.status_of("D"), Some(FanStatus::Unsubscribed));
        assert_eq!(engine.store.status_of("E"), Some(FanStatus::Unsubscribed));
    }

    #[tokio::test]
    async fn follower_sync_is_idempotent() {
        let directory = FakeDirectory::with_follower_pages(vec![MemberListPage::with_ids(
            &["A", "B"],
            None,
            2,
        )]);
        let store = FakeStore::with_members(&[("C", FanStatus::Subscribed)]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let first = engine
            .sync_full_list(&account(), ListKind::Followers)
            .await
            .unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.displaced, 1);
        let writes_after_first = engine.store.status_writes.load(Ordering::SeqCst);

        let second = engine
            .sync_full_list(&account(), ListKind::Followers)
            .await
            .unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.transitioned, 0);
        assert_eq!(second.displaced, 0);
        assert_eq!(
            engine.store.status_writes.load(Ordering::SeqCst),
            writes_after_first
        );
    }

    #[tokio::test]
    async fn blacklist_sync_blocks_and_releases() {
        let directory = FakeDirectory::with_blacklist_pages(vec![MemberListPage::with_ids(
            &["A", "B"],
            None,
            2,
        )]);
        let store = FakeStore::with_members(&[
            ("A", FanStatus::Subscribed),
            ("B", FanStatus::Blocked),
            ("C", FanStatus::Blocked),
        ]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_full_list(&account(), ListKind::Blacklist)
            .await
            .unwrap();

        assert_eq!(report.transitioned, 1); // A
        assert_eq!(report.displaced, 1); // C
        assert_eq!(engine.store.status_of("A"), Some(FanStatus::Blocked));
        assert_eq!(engine.store.status_of("B"), Some(FanStatus::Blocked));
        assert_eq!(engine.store.status_of("C"), Some(FanStatus::Unsubscribed));
    }

    #[tokio::test]
    async fn zero_total_blacklist_releases_everyone_in_one_operation() {
        let directory = FakeDirectory::with_blacklist_pages(vec![MemberListPage {
            total: Some(0),
            count: Some(0),
            next_openid: Some(String::new()),
            ..Default::default()
        }]);
        let store = FakeStore::with_members(&[
            ("X", FanStatus::Blocked),
            ("Y", FanStatus::Blocked),
            ("Z", FanStatus::Subscribed),
        ]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_full_list(&account(), ListKind::Blacklist)
            .await
            .unwrap();

        assert_eq!(report.fetched, 0);
        assert_eq!(report.displaced, 2);
        assert_eq!(engine.store.bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.store.status_of("X"), Some(FanStatus::Unsubscribed));
        assert_eq!(engine.store.status_of("Y"), Some(FanStatus::Unsubscribed));
        assert_eq!(engine.store.status_of("Z"), Some(FanStatus::Subscribed));
    }

    #[test_log::test(tokio::test)]
    async fn malformed_first_page_aborts_without_mutation() {
        let directory = FakeDirectory::with_follower_pages(vec![MemberListPage {
            next_openid: Some("X".into()),
            ..Default::default()
        }]);
        let store = FakeStore::with_members(&[("A", FanStatus::Subscribed)]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let result = engine.sync_full_list(&account(), ListKind::Followers).await;

        assert!(result.is_err());
        assert_eq!(engine.store.status_writes.load(Ordering::SeqCst), 0);
        assert_eq!(engine.store.bulk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.store.status_of("A"), Some(FanStatus::Subscribed));
    }

    #[tokio::test]
    async fn malformed_mid_stream_page_aborts_without_mutation() {
        let directory = FakeDirectory::with_follower_pages(vec![
            MemberListPage::with_ids(&["A"], Some("A"), 5),
            MemberListPage {
                count: Some(4),
                next_openid: Some("B".into()),
                ..Default::default()
            },
        ]);
        let store = FakeStore::with_members(&[("B", FanStatus::Subscribed)]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let result = engine.sync_full_list(&account(), ListKind::Followers).await;

        assert!(result.is_err());
        assert_eq!(engine.store.status_writes.load(Ordering::SeqCst), 0);
        assert_eq!(engine.store.status_of("B"), Some(FanStatus::Subscribed));
    }

    #[tokio::test]
    async fn drained_trailing_page_ends_pagination_cleanly() {
        let directory = FakeDirectory::with_follower_pages(vec![
            MemberListPage::with_ids(&["A", "B"], Some("B"), 2),
            MemberListPage {
                total: Some(2),
                count: Some(0),
                next_openid: Some(String::new()),
                ..Default::default()
            },
        ]);
        let store = FakeStore::default();
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_full_list(&account(), ListKind::Followers)
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.created, 2);
    }

    #[tokio::test]
    async fn duplicate_ids_across_pages_are_counted_once() {
        let directory = FakeDirectory::with_follower_pages(vec![
            MemberListPage::with_ids(&["A", "B"], Some("B"), 3),
            MemberListPage::with_ids(&["B", "C"], None, 3),
        ]);
        let store = FakeStore::default();
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_full_list(&account(), ListKind::Followers)
            .await
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.created, 3);
    }

    #[tokio::test]
    async fn tag_sync_is_a_full_replace() {
        let store = FakeStore::default();
        {
            let mut tags = store.tags.lock().unwrap();
            tags.insert(
                1,
                TagSnapshot {
                    tagid: 1,
                    name: "VIP".into(),
                    fan_count: 10,
                },
            );
            tags.insert(
                2,
                TagSnapshot {
                    tagid: 2,
                    name: "Newbie".into(),
                    fan_count: 4,
                },
            );
        }
        let engine = SyncEngine::new(FakeDirectory::default(), store, fast_options());

        let remote = vec![
            RemoteTag {
                id: 1,
                name: "VIP".into(),
                count: 12,
            },
            RemoteTag {
                id: 3,
                name: "Active".into(),
                count: 7,
            },
        ];
        let report = engine
            .sync_tag_definitions(&account(), &remote)
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);

        let tags = engine.store.tags.lock().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[&1].fan_count, 12);
        assert_eq!(tags[&3].name, "Active");
        assert!(!tags.contains_key(&2));
    }

    #[test_log::test(tokio::test)]
    async fn detail_sync_updates_fields_independently() {
        let directory = FakeDirectory::with_detail_replies(vec![DetailReply::Records(vec![
            json!({
                "openid": "A",
                "subscribe": 1,
                "nickname": "Ann",
                "city": "Shanghai",
                "sex": 2,
                "subscribe_time": 1_700_000_000,
            }),
            // No nickname: the other fields still land.
            json!({"openid": "B", "subscribe": 1, "city": "Beijing"}),
            // No openid: skipped without failing the batch.
            json!({"nickname": "ghost"}),
            // Unknown openid: not part of this batch, skipped.
            json!({"openid": "ZZZ", "nickname": "stranger"}),
        ])]);
        let store = FakeStore::with_members(&[
            ("A", FanStatus::Subscribed),
            ("B", FanStatus::Subscribed),
        ]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_user_details(&account(), &["A".into(), "B".into()])
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 0);

        let applied = engine.store.applied.lock().unwrap();
        let a = applied.iter().find(|u| u.openid == "A").unwrap();
        assert_eq!(a.changes.nickname.as_deref(), Some("Ann"));
        assert_eq!(a.changes.city.as_deref(), Some("Shanghai"));
        assert_eq!(a.changes.gender, Some(Gender::Female));
        assert!(a.changes.subscribe_time.is_some());
        assert_eq!(a.changes.status, None);

        let b = applied.iter().find(|u| u.openid == "B").unwrap();
        assert_eq!(b.changes.nickname, None);
        assert_eq!(b.changes.city.as_deref(), Some("Beijing"));
    }

    #[tokio::test]
    async fn detail_sync_transitions_unsubscribed_members_immediately() {
        let directory = FakeDirectory::with_detail_replies(vec![DetailReply::Records(vec![
            json!({"openid": "A", "subscribe": 0}),
        ])]);
        let store = FakeStore::with_members(&[("A", FanStatus::Subscribed)]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_user_details(&account(), &["A".into()])
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(engine.store.status_of("A"), Some(FanStatus::Unsubscribed));
    }

    #[tokio::test]
    async fn failed_detail_batch_counts_whole_batch_and_continues() {
        let directory = FakeDirectory::with_detail_replies(vec![
            DetailReply::Fail,
            DetailReply::Records(vec![
                json!({"openid": "C", "nickname": "Cleo"}),
                json!({"openid": "D", "nickname": "Didi"}),
            ]),
        ]);
        let store = FakeStore::with_members(&[
            ("A", FanStatus::Subscribed),
            ("B", FanStatus::Subscribed),
            ("C", FanStatus::Subscribed),
            ("D", FanStatus::Subscribed),
        ]);
        let mut options = fast_options();
        options.detail_batch_size = 2;
        let engine = SyncEngine::new(directory, store, options);

        let report = engine
            .sync_user_details(
                &account(),
                &["A".into(), "B".into(), "C".into(), "D".into()],
            )
            .await
            .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.errors, 2);
        assert_eq!(report.processed, 2);
    }

    #[tokio::test]
    async fn missing_record_list_fails_the_batch() {
        let directory = FakeDirectory::with_detail_replies(vec![DetailReply::Missing]);
        let store = FakeStore::with_members(&[("A", FanStatus::Subscribed)]);
        let engine = SyncEngine::new(directory, store, fast_options());

        let report = engine
            .sync_user_details(&account(), &["A".into()])
            .await
            .unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn detail_changes_ignores_mistyped_fields() {
        let record = json!({
            "openid": "A",
            "nickname": 123,
            "city": "Hangzhou",
            "sex": "2",
            "subscribe_time": 0,
        });
        let changes = detail_changes(&record);
        assert_eq!(changes.nickname, None);
        assert_eq!(changes.city.as_deref(), Some("Hangzhou"));
        assert_eq!(changes.gender, Some(Gender::Female));
        assert_eq!(changes.subscribe_time, None);
        assert_eq!(changes.status, None);
    }

    #[test]
    fn follower_pass_never_reclaims_blocked_members() {
        assert!(!ListKind::Followers.may_transition_from(FanStatus::Blocked));
        assert!(ListKind::Followers.may_transition_from(FanStatus::Unsubscribed));
        assert!(ListKind::Blacklist.may_transition_from(FanStatus::Subscribed));
        assert!(ListKind::Blacklist.may_transition_from(FanStatus::Unsubscribed));
    }

    #[test]
    fn success_rate_is_a_percentage() {
        let report = DetailSyncReport {
            total: 160,
            processed: 120,
            errors: 40,
        };
        assert!((report.success_rate() - 75.0).abs() < f64::EPSILON);
    }
}
