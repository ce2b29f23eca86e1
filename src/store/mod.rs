pub mod pg;

pub use pg::PgMirrorStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::enums::FanStatus;
use crate::models::fan::FanDetailChangeset;
use crate::wechat::RemoteTag;

/// What a list sync needs to know about an existing mirror row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub openid: String,
    pub status: FanStatus,
}

/// What a tag sync needs to know about an existing mirror tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSnapshot {
    pub tagid: i64,
    pub name: String,
    pub fan_count: i64,
}

/// One fan's pending detail reconciliation.
#[derive(Debug, Clone)]
pub struct FanDetailUpdate {
    pub openid: String,
    pub changes: FanDetailChangeset,
}

/// Write access to the local mirror, shaped as the batch operations the
/// reconciliation engine needs. All query construction lives behind this
/// trait; each mutating call is one transaction, which is the engine's
/// "flush once per logical batch" discipline made explicit.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Current (openid, status) rows for the given ids of one account.
    async fn find_members(
        &self,
        account_id: i32,
        openids: &[String],
    ) -> Result<Vec<MemberSnapshot>>;

    /// Insert the `create` ids with `status` and move the `transition` ids
    /// to `status`, in one transaction.
    async fn upsert_member_statuses(
        &self,
        account_id: i32,
        status: FanStatus,
        create: &[String],
        transition: &[String],
    ) -> Result<()>;

    /// Move every member currently in `from` whose openid is NOT in
    /// `keep_openids` to `to`; an empty `keep_openids` moves all of them.
    /// Returns the number of rows changed.
    async fn bulk_transition_status(
        &self,
        account_id: i32,
        from: FanStatus,
        to: FanStatus,
        keep_openids: &[String],
    ) -> Result<u64>;

    /// Openids of every member currently `Subscribed`, the candidate set
    /// for detail enrichment.
    async fn subscribed_openids(&self, account_id: i32) -> Result<Vec<String>>;

    /// Apply per-fan field updates in one transaction.
    async fn apply_detail_updates(
        &self,
        account_id: i32,
        updates: &[FanDetailUpdate],
    ) -> Result<()>;

    /// All mirrored tags of one account.
    async fn find_tags(&self, account_id: i32) -> Result<Vec<TagSnapshot>>;

    /// Upsert `upserts` by `(account, tagid)` and delete `delete_tagids`,
    /// in one transaction (join rows cascade with the deleted tags).
    async fn replace_tags(
        &self,
        account_id: i32,
        upserts: &[RemoteTag],
        delete_tagids: &[i64],
    ) -> Result<()>;
}
