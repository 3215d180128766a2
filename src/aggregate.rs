// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Period bucketing and period-over-period deltas for download counts.

use crate::error::MetricsError;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Number of days a weekly bucket must have been open before it is reported.
pub const COMPLETE_WEEK_DAYS: i64 = 7;

/// The calendar unit downloads are summed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
}

impl Granularity {
    /// Truncate a date to the start of the bucket containing it.
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Week => get_week_start(date),
            Granularity::Month => get_month_start(date),
        }
    }

    /// Whether the bucket starting at `period_start` has stopped accumulating
    /// as of the given date.
    ///
    /// Monthly buckets are always reported, including the current month.
    pub fn is_complete(self, period_start: NaiveDate, as_of: NaiveDate) -> bool {
        match self {
            Granularity::Week => (as_of - period_start).num_days() >= COMPLETE_WEEK_DAYS,
            Granularity::Month => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Adjective form used in titles ("weekly", "monthly").
    pub fn adjective(self) -> &'static str {
        match self {
            Granularity::Week => "weekly",
            Granularity::Month => "monthly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            _ => Err(MetricsError::InvalidGranularity(s.to_string())),
        }
    }
}

/// Downloads of one project over one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadRecord {
    pub period_start: NaiveDate,
    pub project: String,
    pub downloads: u64,
    /// Fractional change versus the project's previous bucket.
    pub delta: f64,
}

/// Get the Sunday that starts the week containing the given date.
fn get_week_start(date: NaiveDate) -> NaiveDate {
    let days_from_sunday = date.weekday().num_days_from_sunday();
    date - Duration::days(days_from_sunday as i64)
}

/// Get the first day of the month containing the given date.
fn get_month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

/// Fractional change from `previous` to `current`.
///
/// A zero previous value has no defined ratio and yields 0.
pub fn pct_change(previous: u64, current: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    (current as f64 - previous as f64) / previous as f64
}

/// Fill in `delta` for records sorted by `(period_start, project)`.
///
/// Each project's records are compared against that project's previous
/// record in the slice, whatever the gap between their periods.
pub fn compute_deltas(records: &mut [DownloadRecord]) {
    let mut previous: HashMap<String, u64> = HashMap::new();

    for record in records.iter_mut() {
        record.delta = match previous.get(&record.project) {
            Some(&prev) => pct_change(prev, record.downloads),
            None => 0.0,
        };
        previous.insert(record.project.clone(), record.downloads);
    }
}
