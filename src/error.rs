// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the metrics pipeline and warehouse adapters.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while talking to a warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("HTTP request to warehouse failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("warehouse authentication unavailable: {0}")]
    Auth(String),

    #[error("malformed warehouse row: {0}")]
    MalformedRow(String),
}

/// Errors raised by the metrics derivation pipeline.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("warehouse query failed: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("invalid granularity '{0}': expected 'week' or 'month'")]
    InvalidGranularity(String),

    #[error("invalid axis scale '{0}': expected 'linear' or 'log'")]
    InvalidAxisScale(String),

    #[error("malformed period date '{0}'")]
    MalformedDate(String),

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start date {date} is outside the supported range {min} to {max}")]
    StartDateOutOfRange {
        date: NaiveDate,
        min: NaiveDate,
        max: NaiveDate,
    },
}

/// Result type for pipeline operations.
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warehouse_error_wraps_into_metrics_error() {
        let err: MetricsError = WarehouseError::Api {
            status: 403,
            body: "access denied".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("warehouse query failed"));
        assert!(msg.contains("403"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn test_start_date_out_of_range_message() {
        let err = MetricsError::StartDateOutOfRange {
            date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
            min: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            max: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "start date 2019-06-01 is outside the supported range 2020-01-01 to 2026-10-17"
        );
    }
}
