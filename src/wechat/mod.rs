// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod types;

pub use client::{DirectoryClient, WeChatClient};
pub use types::{MemberListPage, RemoteTag};
