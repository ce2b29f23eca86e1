// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

pub mod engine;
pub mod jobs;
pub mod schedule;

pub use engine::{
    DetailSyncReport, ListKind, ListSyncReport, SyncAnomaly, SyncEngine, SyncOptions,
    TagSyncReport,
};
pub use jobs::{SyncJob, SyncRuntime};
