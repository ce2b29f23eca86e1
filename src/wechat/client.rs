// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::WeChatConfig;
use crate::models::account::WechatAccount;
use crate::wechat::types::{
    MemberListPage, RemoteTag, TagListResponse, TokenResponse, UserDetailBatchResponse,
};

/// Error envelope returned by the directory API.
#[derive(Debug, Error)]
#[error("wechat api error {code}: {message}")]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

// Token invalidity codes; a cached credential carrying one is discarded so
// the next call fetches a fresh one.
const CODE_INVALID_CREDENTIAL: i64 = 40001;
const CODE_CREDENTIAL_EXPIRED: i64 = 42001;

/// Read access to the remote member directory. The access credential and
/// its refresh/expiry are entirely this collaborator's concern; callers
/// never see a token.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// One page of the full follower list.
    async fn follower_page(
        &self,
        account: &WechatAccount,
        cursor: Option<&str>,
    ) -> Result<MemberListPage>;

    /// One page of the full blacklist.
    async fn blacklist_page(
        &self,
        account: &WechatAccount,
        cursor: Option<&str>,
    ) -> Result<MemberListPage>;

    /// The complete, authoritative tag set for the account (not paginated).
    /// `Ok(None)` means the response arrived but carried no tag payload.
    async fn tag_list(&self, account: &WechatAccount) -> Result<Option<Vec<RemoteTag>>>;

    /// Detail records for up to 100 openids. `Ok(None)` means the response
    /// arrived but carried no record payload.
    async fn user_detail_batch(
        &self,
        account: &WechatAccount,
        openids: &[String],
    ) -> Result<Option<Vec<Value>>>;
}

#[async_trait]
impl<T: DirectoryClient + ?Sized> DirectoryClient for std::sync::Arc<T> {
    async fn follower_page(
        &self,
        account: &WechatAccount,
        cursor: Option<&str>,
    ) -> Result<MemberListPage> {
        (**self).follower_page(account, cursor).await
    }

    async fn blacklist_page(
        &self,
        account: &WechatAccount,
        cursor: Option<&str>,
    ) -> Result<MemberListPage> {
        (**self).blacklist_page(account, cursor).await
    }

    async fn tag_list(&self, account: &WechatAccount) -> Result<Option<Vec<RemoteTag>>> {
        (**self).tag_list(account).await
    }

    async fn user_detail_batch(
        &self,
        account: &WechatAccount,
        openids: &[String],
    ) -> Result<Option<Vec<Value>>> {
        (**self).user_detail_batch(account, openids).await
    }
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// HTTP client for the WeChat Official Account API, with a per-account
/// access-token cache.
pub struct WeChatClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Mutex<HashMap<i32, CachedToken>>,
}

impl WeChatClient {
    pub fn new(config: &WeChatConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Return a valid access token for the account, fetching a new one when
    /// the cached token is missing or about to expire.
    async fn access_token(&self, account: &WechatAccount) -> Result<String> {
        {
            let tokens = self.tokens.lock().await;
            if let Some(cached) = tokens.get(&account.id) {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        debug!(account = account.id, "fetching fresh access token");
        let response: TokenResponse = self
            .http
            .get(self.endpoint("/cgi-bin/token"))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", account.app_id.as_str()),
                ("secret", account.app_secret.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        if response.errcode != 0 {
            return Err(ApiError {
                code: response.errcode,
                message: response.errmsg,
            }
            .into());
        }

        let token = response
            .access_token
            .ok_or_else(|| anyhow!("token response carried no access_token"))?;
        // Refresh two minutes before the advertised expiry
        let ttl = response.expires_in.unwrap_or(7200).max(300) - 120;

        let mut tokens = self.tokens.lock().await;
        tokens.insert(
            account.id,
            CachedToken {
                token: token.clone(),
                expires_at: Utc::now() + chrono::Duration::seconds(ttl),
            },
        );

        Ok(token)
    }

    /// Check the error envelope shared by every endpoint, dropping the
    /// cached token first when the directory says it is no longer valid.
    async fn ensure_ok(&self, account: &WechatAccount, errcode: i64, errmsg: String) -> Result<()> {
        if errcode == 0 {
            return Ok(());
        }
        if errcode == CODE_INVALID_CREDENTIAL || errcode == CODE_CREDENTIAL_EXPIRED {
            warn!(account = account.id, errcode, "access token rejected, discarding cache");
            self.tokens.lock().await.remove(&account.id);
        }
        Err(ApiError {
            code: errcode,
            message: errmsg,
        }
        .into())
    }

    async fn member_list_page(
        &self,
        account: &WechatAccount,
        path: &str,
        cursor_param: &str,
        cursor: Option<&str>,
        post_cursor_in_body: bool,
    ) -> Result<MemberListPage> {
        let token = self.access_token(account).await?;

        let request = if post_cursor_in_body {
            let mut body = serde_json::Map::new();
            if let Some(cursor) = cursor {
                body.insert(cursor_param.to_string(), Value::String(cursor.to_string()));
            }
            self.http
                .post(self.endpoint(path))
                .query(&[("access_token", token.as_str())])
                .json(&Value::Object(body))
        } else {
            let mut query = vec![("access_token", token.clone())];
            if let Some(cursor) = cursor {
                query.push((cursor_param, cursor.to_string()));
            }
            self.http.get(self.endpoint(path)).query(&query)
        };

        let page: MemberListPage = request.send().await?.json().await?;
        self.ensure_ok(account, page.errcode, page.errmsg.clone()).await?;

        Ok(page)
    }
}

#[async_trait]
impl DirectoryClient for WeChatClient {
    async fn follower_page(
        &self,
        account: &WechatAccount,
        cursor: Option<&str>,
    ) -> Result<MemberListPage> {
        self.member_list_page(account, "/cgi-bin/user/get", "next_openid", cursor, false)
            .await
    }

    async fn blacklist_page(
        &self,
        account: &WechatAccount,
        cursor: Option<&str>,
    ) -> Result<MemberListPage> {
        self.member_list_page(
            account,
            "/cgi-bin/tags/members/getblacklist",
            "begin_openid",
            cursor,
            true,
        )
        .await
    }

    async fn tag_list(&self, account: &WechatAccount) -> Result<Option<Vec<RemoteTag>>> {
        let token = self.access_token(account).await?;

        let response: TagListResponse = self
            .http
            .get(self.endpoint("/cgi-bin/tags/get"))
            .query(&[("access_token", token.as_str())])
            .send()
            .await?
            .json()
            .await?;

        self.ensure_ok(account, response.errcode, response.errmsg.clone())
            .await?;

        Ok(response.tags)
    }

    async fn user_detail_batch(
        &self,
        account: &WechatAccount,
        openids: &[String],
    ) -> Result<Option<Vec<Value>>> {
        let token = self.access_token(account).await?;

        let user_list: Vec<Value> = openids
            .iter()
            .map(|openid| json!({"openid": openid, "lang": "zh_CN"}))
            .collect();

        let response: UserDetailBatchResponse = self
            .http
            .post(self.endpoint("/cgi-bin/user/info/batchget"))
            .query(&[("access_token", token.as_str())])
            .json(&json!({ "user_list": user_list }))
            .send()
            .await?
            .json()
            .await?;

        self.ensure_ok(account, response.errcode, response.errmsg.clone())
            .await?;

        Ok(response.user_info_list)
    }
}
