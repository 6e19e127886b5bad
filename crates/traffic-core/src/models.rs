use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::TrafficError;

/// Default minimum traffic (bytes) for a user to count as significant: 100 KiB.
pub const DEFAULT_MIN_TRAFFIC_THRESHOLD: u64 = 102_400;

/// Default cap on the number of users drawn in the chart.
pub const DEFAULT_MAX_DISPLAYED_USERS: usize = 100;

/// Number of names reported in [`AggregationResult::top_users`].
pub const TOP_USERS_COUNT: usize = 3;

/// A single per-user, per-day bandwidth record as returned by the panel API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Account name the traffic is attributed to.
    pub username: String,
    /// Raw timestamp string; parsed leniently during aggregation.
    pub date: String,
    /// Bytes transferred.
    pub total: u64,
}

impl UsageRecord {
    pub fn new(username: impl Into<String>, date: impl Into<String>, total: u64) -> Self {
        Self {
            username: username.into(),
            date: date.into(),
            total,
        }
    }
}

/// Size of the time bucket records are grouped into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per calendar day, labelled `"Jan 2"`.
    #[default]
    Daily,
    /// One bucket per calendar month, labelled `"Jan 2024"`.
    Monthly,
}

impl FromStr for Granularity {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            other => Err(TrafficError::Config(format!("unknown granularity: {other}"))),
        }
    }
}

/// Knobs controlling which users end up in the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationParameters {
    /// Restrict the chart to these users. Empty means no restriction.
    pub selected_users: BTreeSet<String>,
    /// Users below this many bytes in total are never charted.
    pub min_traffic_threshold: u64,
    /// Upper bound on the number of charted users.
    pub max_displayed_users: usize,
    /// IANA timezone used to decide which day a timestamp falls on.
    /// `None` means UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub granularity: Granularity,
}

impl Default for AggregationParameters {
    fn default() -> Self {
        Self {
            selected_users: BTreeSet::new(),
            min_traffic_threshold: DEFAULT_MIN_TRAFFIC_THRESHOLD,
            max_displayed_users: DEFAULT_MAX_DISPLAYED_USERS,
            timezone: None,
            granularity: Granularity::Daily,
        }
    }
}

/// A user whose total meets the traffic threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificantUser {
    pub name: String,
    pub total: u64,
}

/// One chart line: a user's usage per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSeries {
    pub name: String,
    /// Bytes per category, positionally aligned with
    /// [`AggregationResult::categories`].
    pub data: Vec<u64>,
    pub total: u64,
    /// `#rrggbb`, stable for a given username.
    pub color: String,
}

/// Total usage of every user within one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: u64,
}

/// Chart-ready output of the usage aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    /// Bucket labels in chronological order.
    pub categories: Vec<String>,
    pub user_totals: BTreeMap<String, u64>,
    /// Users at or above the threshold, largest first.
    pub significant_users: Vec<SignificantUser>,
    pub series: Vec<UserSeries>,
    pub trend_data: Vec<TrendPoint>,
    pub total_usage: u64,
    pub user_count: usize,
    pub significant_user_count: usize,
    pub displayed_user_count: usize,
    pub top_users: Vec<String>,
    /// Records left out because their timestamp could not be parsed.
    pub dropped_record_count: usize,
}

impl AggregationResult {
    /// `true` when nothing was bucketed.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.user_totals.is_empty()
    }
}
