use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::wechat_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WechatAccount {
    pub id: i32,
    pub name: String,
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_secret: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::wechat_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewWechatAccount {
    pub name: String,
    pub app_id: String,
    pub app_secret: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
