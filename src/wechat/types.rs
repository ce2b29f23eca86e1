// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated member list (followers or blacklist).
///
/// The directory omits `data` on two very different occasions: an account
/// with a zero `total`, and a drained cursor at the end of pagination. The
/// sync engine tells those apart from a genuinely malformed page; this type
/// only preserves the distinctions faithfully.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MemberListPage {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    pub total: Option<i64>,
    pub count: Option<i64>,
    pub data: Option<MemberIdList>,
    pub next_openid: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MemberIdList {
    pub openid: Option<Vec<String>>,
}

impl MemberListPage {
    /// The page's ids, or `None` when the id payload is absent.
    pub fn openids(&self) -> Option<&[String]> {
        self.data.as_ref()?.openid.as_deref()
    }

    /// Cursor for the next page; an empty string means the list is drained.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_openid.as_deref().filter(|c| !c.is_empty())
    }

    /// Explicit "this list is empty" signal.
    pub fn reports_zero_total(&self) -> bool {
        self.total == Some(0)
    }

    /// Trailing page past the last id: no payload, nothing left to fetch.
    pub fn is_drained(&self) -> bool {
        self.count.unwrap_or(0) == 0 && self.next_cursor().is_none()
    }

    #[cfg(test)]
    pub fn with_ids(openids: &[&str], next: Option<&str>, total: i64) -> Self {
        MemberListPage {
            total: Some(total),
            count: Some(openids.len() as i64),
            data: Some(MemberIdList {
                openid: Some(openids.iter().map(|s| s.to_string()).collect()),
            }),
            next_openid: next.map(str::to_string),
            ..Default::default()
        }
    }
}

/// One tag definition as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct TagListResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    pub tags: Option<Vec<RemoteTag>>,
}

#[derive(Debug, Deserialize)]
pub struct UserDetailBatchResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    /// Kept as raw JSON: individual records are reconciled field by field,
    /// and one mistyped field must not poison the rest of the batch.
    pub user_info_list: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_page_deserializes() {
        let raw = r#"{
            "total": 23000,
            "count": 2,
            "data": {"openid": ["OPENID1", "OPENID2"]},
            "next_openid": "OPENID2"
        }"#;
        let page: MemberListPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.openids().unwrap(), ["OPENID1", "OPENID2"]);
        assert_eq!(page.next_cursor(), Some("OPENID2"));
        assert!(!page.reports_zero_total());
    }

    #[test]
    fn zero_total_page_has_no_ids() {
        let raw = r#"{"total": 0, "count": 0, "next_openid": ""}"#;
        let page: MemberListPage = serde_json::from_str(raw).unwrap();
        assert!(page.openids().is_none());
        assert!(page.reports_zero_total());
        assert!(page.next_cursor().is_none());
    }

    #[test]
    fn drained_trailing_page_is_not_malformed() {
        let raw = r#"{"total": 2, "count": 0, "next_openid": ""}"#;
        let page: MemberListPage = serde_json::from_str(raw).unwrap();
        assert!(page.openids().is_none());
        assert!(page.is_drained());
        assert!(!page.reports_zero_total());
    }

    #[test]
    fn error_envelope_deserializes() {
        let raw = r#"{"errcode": 40013, "errmsg": "invalid appid"}"#;
        let page: MemberListPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.errcode, 40013);
        assert_eq!(page.errmsg, "invalid appid");
    }

    #[test]
    fn tag_list_deserializes_with_missing_count() {
        let raw = r#"{"tags": [{"id": 1, "name": "VIP", "count": 268}, {"id": 2, "name": "Newbie"}]}"#;
        let resp: TagListResponse = serde_json::from_str(raw).unwrap();
        let tags = resp.tags.unwrap();
        assert_eq!(tags[0].count, 268);
        assert_eq!(tags[1].count, 0);
    }

    #[test]
    fn detail_batch_keeps_records_raw() {
        let raw = r#"{"user_info_list": [{"openid": "A", "subscribe": 1, "sex": "not-a-number"}]}"#;
        let resp: UserDetailBatchResponse = serde_json::from_str(raw).unwrap();
        let records = resp.user_info_list.unwrap();
        assert_eq!(records[0]["openid"], "A");
        assert!(records[0]["sex"].as_i64().is_none());
    }
}
