// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The boundary to the analytics warehouse that stores daily download counts.

use crate::{
    bigquery::BigQueryClient,
    db::SqliteWarehouse,
    error::{MetricsError, WarehouseError},
    query::Dialect,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// A date value as the warehouse returned it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDate {
    /// `YYYY-MM-DD`, optionally followed by a time of day.
    Text(String),
    /// Seconds since the Unix epoch (BigQuery `TIMESTAMP`).
    EpochSeconds(f64),
}

impl RawDate {
    /// Convert to a calendar date.
    pub fn normalize(&self) -> Result<NaiveDate, MetricsError> {
        match self {
            RawDate::Text(text) => parse_date_text(text),
            RawDate::EpochSeconds(secs) => {
                if !secs.is_finite() {
                    return Err(MetricsError::MalformedDate(secs.to_string()));
                }
                DateTime::from_timestamp(secs.floor() as i64, 0)
                    .map(|dt| dt.date_naive())
                    .ok_or_else(|| MetricsError::MalformedDate(secs.to_string()))
            }
        }
    }
}

fn parse_date_text(text: &str) -> Result<NaiveDate, MetricsError> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(datetime.date());
        }
    }
    Err(MetricsError::MalformedDate(text.to_string()))
}

/// One row of the aggregation query's result.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub period_start: RawDate,
    pub project: String,
    pub downloads: u64,
}

/// A store that can run the aggregation query.
///
/// Implementations return rows with the columns `period_start`, `project`
/// and `downloads`, in that order.
#[allow(async_fn_in_trait)]
pub trait Warehouse {
    /// SQL dialect the warehouse understands.
    fn dialect(&self) -> Dialect;

    /// Fully qualified table holding one row per (date, project).
    fn table(&self) -> &str;

    /// Run a read-only query.
    async fn execute(&self, sql: &str) -> Result<Vec<RawRow>, WarehouseError>;
}

/// Whichever warehouse the configuration selected.
pub enum AnyWarehouse {
    Sqlite(SqliteWarehouse),
    BigQuery(BigQueryClient),
}

impl Warehouse for AnyWarehouse {
    fn dialect(&self) -> Dialect {
        match self {
            AnyWarehouse::Sqlite(w) => w.dialect(),
            AnyWarehouse::BigQuery(w) => w.dialect(),
        }
    }

    fn table(&self) -> &str {
        match self {
            AnyWarehouse::Sqlite(w) => w.table(),
            AnyWarehouse::BigQuery(w) => w.table(),
        }
    }

    async fn execute(&self, sql: &str) -> Result<Vec<RawRow>, WarehouseError> {
        match self {
            AnyWarehouse::Sqlite(w) => w.execute(sql).await,
            AnyWarehouse::BigQuery(w) => w.execute(sql).await,
        }
    }
}
