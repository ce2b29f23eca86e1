// Copyright (c) WeFans Team
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::io::Write;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::{SmallInt, Text};
use serde::{Deserialize, Serialize};

/// Subscription status of a fan. Exactly one status holds at any time;
/// list syncs transition it, administrative screens only read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum FanStatus {
    Subscribed,
    Unsubscribed,
    Blocked,
}

impl FanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanStatus::Subscribed => "subscribed",
            FanStatus::Unsubscribed => "unsubscribed",
            FanStatus::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribed" => Some(FanStatus::Subscribed),
            "unsubscribed" => Some(FanStatus::Unsubscribed),
            "blocked" => Some(FanStatus::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for FanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Pg> for FanStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for FanStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = std::str::from_utf8(bytes.as_bytes())?;
        FanStatus::parse(raw).ok_or_else(|| format!("unrecognized fan status: {raw}").into())
    }
}

/// Gender as reported by the directory: 0 unknown, 1 male, 2 female.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Unknown,
    Male,
    Female,
}

impl Gender {
    /// Out-of-range codes collapse to `Unknown` rather than failing the row.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Gender::Male,
            2 => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            Gender::Unknown => 0,
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

impl ToSql<SmallInt, Pg> for Gender {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match self {
            Gender::Unknown => <i16 as ToSql<SmallInt, Pg>>::to_sql(&0, &mut out.reborrow()),
            Gender::Male => <i16 as ToSql<SmallInt, Pg>>::to_sql(&1, &mut out.reborrow()),
            Gender::Female => <i16 as ToSql<SmallInt, Pg>>::to_sql(&2, &mut out.reborrow()),
        }
    }
}

impl FromSql<SmallInt, Pg> for Gender {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let code = <i16 as FromSql<SmallInt, Pg>>::from_sql(bytes)?;
        Ok(Gender::from_code(i64::from(code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [FanStatus::Subscribed, FanStatus::Unsubscribed, FanStatus::Blocked] {
            assert_eq!(FanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FanStatus::parse("banned"), None);
    }

    #[test]
    fn gender_codes_collapse_to_unknown() {
        assert_eq!(Gender::from_code(1), Gender::Male);
        assert_eq!(Gender::from_code(2), Gender::Female);
        assert_eq!(Gender::from_code(0), Gender::Unknown);
        assert_eq!(Gender::from_code(7), Gender::Unknown);
        assert_eq!(Gender::from_code(-1), Gender::Unknown);
    }
}
