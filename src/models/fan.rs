// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::enums::{FanStatus, Gender};
use crate::schema::wechat_fans;

/// Mirror row for one fan of one account. `(account_id, openid)` is unique;
/// the openid is opaque and stable for the lifetime of the relationship.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = wechat_fans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Fan {
    pub id: i32,
    pub account_id: i32,
    pub openid: String,
    pub unionid: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub gender: Option<Gender>,
    pub language: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub subscribe_time: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub status: FanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape used when a list sync first observes an openid. Profile
/// fields stay empty until the detail sync fills them in.
#[derive(Debug, Insertable)]
#[diesel(table_name = wechat_fans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewFan {
    pub account_id: i32,
    pub openid: String,
    pub status: FanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewFan {
    pub fn observed(account_id: i32, openid: &str, status: FanStatus) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            openid: openid.to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field-level changeset applied by the detail sync. `None` leaves the
/// column untouched, so one malformed field never blocks the others.
#[derive(Debug, Default, Clone, AsChangeset)]
#[diesel(table_name = wechat_fans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FanDetailChangeset {
    pub unionid: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub gender: Option<Gender>,
    pub language: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub subscribe_time: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub status: Option<FanStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FanDetailChangeset {
    pub fn is_empty(&self) -> bool {
        self.unionid.is_none()
            && self.nickname.is_none()
            && self.avatar_url.is_none()
            && self.gender.is_none()
            && self.language.is_none()
            && self.city.is_none()
            && self.province.is_none()
            && self.country.is_none()
            && self.subscribe_time.is_none()
            && self.remark.is_none()
            && self.status.is_none()
    }
}
