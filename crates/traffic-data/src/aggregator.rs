//! Per-user bandwidth aggregation for the usage chart.
//!
//! Turns a flat list of [`UsageRecord`]s into chart categories, one aligned
//! series per displayed user and an all-users trend line.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};
use traffic_core::colors::color_for_username;
use traffic_core::formatting::{format_day_label, format_month_label};
use traffic_core::models::{
    AggregationParameters, AggregationResult, Granularity, SignificantUser, TrendPoint,
    UsageRecord, UserSeries, TOP_USERS_COUNT,
};
use traffic_core::time_utils::TimezoneHandler;

// ── Bucketing ─────────────────────────────────────────────────────────────────

/// One cell of the usage grid: a bucket start date and a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey<'a> {
    bucket: NaiveDate,
    username: &'a str,
}

/// A user's running total, borrowed from the input records.
#[derive(Debug, Clone, Copy)]
struct UserTotal<'a> {
    name: &'a str,
    total: u64,
}

/// Intermediate state built in the single pass over the records.
#[derive(Debug, Default)]
struct Buckets<'a> {
    cells: HashMap<BucketKey<'a>, u64>,
    /// All-users total per bucket; ordered by date.
    per_bucket: BTreeMap<NaiveDate, u64>,
    /// Users in first-encounter order.
    users: Vec<UserTotal<'a>>,
    user_index: HashMap<&'a str, usize>,
    dropped: usize,
}

impl<'a> Buckets<'a> {
    fn add(&mut self, bucket: NaiveDate, username: &'a str, total: u64) {
        let cell = self.cells.entry(BucketKey { bucket, username }).or_default();
        *cell = cell.saturating_add(total);

        let day_total = self.per_bucket.entry(bucket).or_default();
        *day_total = day_total.saturating_add(total);

        let idx = *self.user_index.entry(username).or_insert_with(|| {
            self.users.push(UserTotal { name: username, total: 0 });
            self.users.len() - 1
        });
        self.users[idx].total = self.users[idx].total.saturating_add(total);
    }

    fn cell(&self, bucket: NaiveDate, username: &'a str) -> u64 {
        self.cells
            .get(&BucketKey { bucket, username })
            .copied()
            .unwrap_or(0)
    }
}

// ── UsageAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that shapes usage records into chart data.
pub struct UsageAggregator;

impl UsageAggregator {
    /// Aggregate `records` according to `params`.
    ///
    /// Pure and deterministic. Records whose timestamp cannot be parsed are
    /// excluded from every total and reported in
    /// [`AggregationResult::dropped_record_count`].
    pub fn aggregate(records: &[UsageRecord], params: &AggregationParameters) -> AggregationResult {
        if records.is_empty() {
            return AggregationResult::default();
        }

        let tz = TimezoneHandler::from_optional(params.timezone.as_deref());
        let buckets = Self::bucket_records(records, &tz, params.granularity);
        if buckets.dropped > 0 {
            warn!(
                dropped = buckets.dropped,
                total = records.len(),
                "skipped usage records with unparseable timestamps"
            );
        }

        let bucket_dates: Vec<NaiveDate> = buckets.per_bucket.keys().copied().collect();
        let labels = Self::bucket_labels(&bucket_dates, params.granularity);

        let ranked = Self::rank_significant(&buckets.users, params.min_traffic_threshold);
        let displayed: Vec<UserTotal<'_>> = ranked
            .iter()
            .take(params.max_displayed_users)
            .filter(|u| params.selected_users.is_empty() || params.selected_users.contains(u.name))
            .copied()
            .collect();

        let series: Vec<UserSeries> = displayed
            .iter()
            .map(|user| UserSeries {
                name: user.name.to_string(),
                data: bucket_dates
                    .iter()
                    .map(|&bucket| buckets.cell(bucket, user.name))
                    .collect(),
                total: user.total,
                color: color_for_username(user.name),
            })
            .collect();

        let trend_data: Vec<TrendPoint> = labels
            .iter()
            .zip(buckets.per_bucket.values())
            .map(|(label, &value)| TrendPoint {
                date: label.clone(),
                value,
            })
            .collect();

        let total_usage = buckets
            .users
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.total));

        let significant_users: Vec<SignificantUser> = ranked
            .iter()
            .map(|u| SignificantUser {
                name: u.name.to_string(),
                total: u.total,
            })
            .collect();

        let top_users = significant_users
            .iter()
            .take(TOP_USERS_COUNT)
            .map(|u| u.name.clone())
            .collect();

        let result = AggregationResult {
            categories: labels,
            user_totals: buckets
                .users
                .iter()
                .map(|u| (u.name.to_string(), u.total))
                .collect(),
            significant_user_count: significant_users.len(),
            significant_users,
            displayed_user_count: series.len(),
            series,
            trend_data,
            total_usage,
            user_count: buckets.users.len(),
            top_users,
            dropped_record_count: buckets.dropped,
        };

        debug!(
            records = records.len(),
            categories = result.categories.len(),
            users = result.user_count,
            displayed = result.displayed_user_count,
            "usage aggregation complete"
        );

        result
    }

    // ── Private ───────────────────────────────────────────────────────────────

    fn bucket_records<'a>(
        records: &'a [UsageRecord],
        tz: &TimezoneHandler,
        granularity: Granularity,
    ) -> Buckets<'a> {
        let mut buckets = Buckets::default();
        for record in records {
            let Some(day) = tz.local_date(&record.date) else {
                buckets.dropped += 1;
                continue;
            };
            let bucket = match granularity {
                Granularity::Daily => day,
                Granularity::Monthly => day.with_day(1).unwrap_or(day),
            };
            buckets.add(bucket, &record.username, record.total);
        }
        buckets
    }

    /// Labels for sorted bucket dates. Daily labels carry the year only when
    /// the range crosses a year boundary, so labels never repeat.
    fn bucket_labels(dates: &[NaiveDate], granularity: Granularity) -> Vec<String> {
        match granularity {
            Granularity::Daily => {
                let spans_years = match (dates.first(), dates.last()) {
                    (Some(first), Some(last)) => first.year() != last.year(),
                    _ => false,
                };
                dates
                    .iter()
                    .map(|&d| format_day_label(d, spans_years))
                    .collect()
            }
            Granularity::Monthly => dates.iter().map(|&d| format_month_label(d)).collect(),
        }
    }

    /// Users at or above `threshold`, largest first. Equal totals keep
    /// first-encounter order.
    fn rank_significant<'a>(users: &[UserTotal<'a>], threshold: u64) -> Vec<UserTotal<'a>> {
        let mut ranked: Vec<UserTotal<'a>> = users
            .iter()
            .filter(|u| u.total >= threshold)
            .copied()
            .collect();
        ranked.sort_by(|a, b| b.total.cmp(&a.total));
        ranked
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
