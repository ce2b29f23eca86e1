// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveTime, Utc};
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::sync::jobs::{SyncJob, SyncRuntime};

/// Parse a daily run time in `HH:MM` form (UTC).
pub fn parse_run_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| anyhow!("invalid schedule time '{value}': {e}"))
}

/// Time left until the next daily occurrence of `at`.
pub fn until_next_run(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

/// Run the four daily jobs at their configured offsets, forever. The
/// offsets are staggered so no two jobs load the directory API at once.
pub async fn run_scheduler(runtime: Arc<SyncRuntime>) -> Result<()> {
    let config = Config::get();
    let slots = [
        (SyncJob::Tags, parse_run_time(&config.sync.tag_sync_at)?),
        (
            SyncJob::Followers,
            parse_run_time(&config.sync.follower_sync_at)?,
        ),
        (
            SyncJob::UserDetails,
            parse_run_time(&config.sync.user_detail_sync_at)?,
        ),
        (
            SyncJob::Blacklist,
            parse_run_time(&config.sync.blacklist_sync_at)?,
        ),
    ];

    let mut handles = Vec::new();
    for (job, at) in slots {
        let runtime = runtime.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let wait = until_next_run(Utc::now(), at);
                info!(job = %job, in_secs = wait.as_secs(), "next run scheduled");
                sleep(wait).await;

                if let Err(e) = runtime.run(job).await {
                    error!(job = %job, error = ?e, "scheduled sync job failed");
                }
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
