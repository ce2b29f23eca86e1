// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

// Import diesel table macros
use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

// Official accounts whose fan base is mirrored locally
table! {
    wechat_accounts (id) {
        id -> Integer,
        name -> Varchar,
        app_id -> Varchar,
        app_secret -> Varchar,
        active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// One follower/blacklisted user of one account
table! {
    wechat_fans (id) {
        id -> Integer,
        account_id -> Integer,
        openid -> Varchar,
        unionid -> Nullable<Varchar>,
        nickname -> Nullable<Varchar>,
        avatar_url -> Nullable<Varchar>,
        gender -> Nullable<SmallInt>,
        language -> Nullable<Varchar>,
        city -> Nullable<Varchar>,
        province -> Nullable<Varchar>,
        country -> Nullable<Varchar>,
        subscribe_time -> Nullable<Timestamptz>,
        remark -> Nullable<Varchar>,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Tag definitions mirrored from the account's directory
table! {
    wechat_fan_tags (id) {
        id -> Integer,
        account_id -> Integer,
        tagid -> BigInt,
        name -> Varchar,
        fan_count -> BigInt,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Join rows assigning tags to fans
table! {
    wechat_fan_tag_relations (id) {
        id -> Integer,
        fan_id -> Integer,
        tag_id -> Integer,
        created_at -> Timestamptz,
    }
}

joinable!(wechat_fans -> wechat_accounts (account_id));
joinable!(wechat_fan_tags -> wechat_accounts (account_id));
joinable!(wechat_fan_tag_relations -> wechat_fans (fan_id));
joinable!(wechat_fan_tag_relations -> wechat_fan_tags (tag_id));

allow_tables_to_appear_in_same_query!(
    wechat_accounts,
    wechat_fans,
    wechat_fan_tags,
    wechat_fan_tag_relations,
);
