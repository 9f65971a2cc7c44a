use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::LimitsConfig;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Plus,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Plus => "plus",
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Plan::Plus)
    }

    /// Lenient read of the stored column: anything unknown is `free`.
    pub fn from_db(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "plus" => Ok(Plan::Plus),
            other => Err(format!("unknown plan `{other}`")),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-limited AI features with a daily counter each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    /// Material generation.
    Gen,
    /// Solution navigator (chat tutoring).
    Navi,
}

impl UsageKind {
    /// Counter column in `usage_logs`.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            UsageKind::Gen => "gen_count",
            UsageKind::Navi => "navi_count",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UsageKind::Gen => "Material generation",
            UsageKind::Navi => "Solution navigator",
        }
    }

    /// Feature tag the frontend uses to pick an upgrade prompt.
    pub fn feature(&self) -> &'static str {
        match self {
            UsageKind::Gen => "generate-limit",
            UsageKind::Navi => "chat-limit",
        }
    }
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UsageKind::Gen => "gen",
            UsageKind::Navi => "navi",
        })
    }
}

/// Counters for one user and one usage day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounts {
    pub gen_count: i64,
    pub navi_count: i64,
}

impl UsageCounts {
    pub fn get(&self, kind: UsageKind) -> i64 {
        match kind {
            UsageKind::Gen => self.gen_count,
            UsageKind::Navi => self.navi_count,
        }
    }
}

/// Result of trying to spend one unit of a daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    Consumed { new_count: i64 },
    Exceeded { current: i64 },
}

/// Per-day limits for the free plan.
#[derive(Debug, Clone, Copy)]
pub struct DailyLimits {
    pub gen_max_per_day: i64,
    pub navi_max_per_day: i64,
}

impl From<LimitsConfig> for DailyLimits {
    fn from(cfg: LimitsConfig) -> Self {
        Self {
            gen_max_per_day: cfg.gen_max_per_day,
            navi_max_per_day: cfg.navi_max_per_day,
        }
    }
}

impl DailyLimits {
    pub fn max_for(&self, kind: UsageKind) -> i64 {
        match kind {
            UsageKind::Gen => self.gen_max_per_day,
            UsageKind::Navi => self.navi_max_per_day,
        }
    }

    pub fn remaining(&self, kind: UsageKind, counts: &UsageCounts) -> i64 {
        (self.max_for(kind) - counts.get(kind)).max(0)
    }
}

/// Usage days roll over at midnight Asia/Tokyo (UTC+9, no DST).
pub fn usage_day(now: DateTime<Utc>) -> NaiveDate {
    (now + TimeDelta::hours(9)).date_naive()
}

pub fn today() -> NaiveDate {
    usage_day(Utc::now())
}

/// Storage format of the `usage_logs.date` column.
pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn usage_day_follows_tokyo_midnight() {
        let before = Utc.with_ymd_and_hms(2025, 3, 31, 14, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 31, 15, 0, 0).unwrap();
        assert_eq!(day_key(usage_day(before)), "2025-03-31");
        assert_eq!(day_key(usage_day(after)), "2025-04-01");
    }

    #[test]
    fn plan_parsing_is_lenient_from_db() {
        assert_eq!(Plan::from_db("plus"), Plan::Plus);
        assert_eq!(Plan::from_db("free"), Plan::Free);
        assert_eq!(Plan::from_db("enterprise"), Plan::Free);
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn remaining_never_negative() {
        let limits = DailyLimits {
            gen_max_per_day: 10,
            navi_max_per_day: 3,
        };
        let counts = UsageCounts {
            gen_count: 4,
            navi_count: 5,
        };
        assert_eq!(limits.remaining(UsageKind::Gen, &counts), 6);
        assert_eq!(limits.remaining(UsageKind::Navi, &counts), 0);
    }
}
