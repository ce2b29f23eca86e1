// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{wechat_fan_tag_relations, wechat_fan_tags};

/// Mirror row for one tag definition of one account. `tagid` is the
/// directory-issued id; `fan_count` is the remote display count, reconciled
/// separately against the true relation count.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = wechat_fan_tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FanTag {
    pub id: i32,
    pub account_id: i32,
    pub tagid: i64,
    pub name: String,
    pub fan_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wechat_fan_tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewFanTag {
    pub account_id: i32,
    pub tagid: i64,
    pub name: String,
    pub fan_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join row assigning one tag to one fan, unique per pair.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = wechat_fan_tag_relations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FanTagRelation {
    pub id: i32,
    pub fan_id: i32,
    pub tag_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wechat_fan_tag_relations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewFanTagRelation {
    pub fan_id: i32,
    pub tag_id: i32,
    pub created_at: DateTime<Utc>,
}
