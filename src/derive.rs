// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derivation of per-period download records from the warehouse.

use crate::{
    aggregate::{self, DownloadRecord, Granularity},
    cache::QueryCache,
    error::MetricsResult,
    query::AggregationQuery,
    warehouse::{RawRow, Warehouse},
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Derives download records for the tracked projects from one warehouse.
pub struct MetricsDeriver<'a, W> {
    warehouse: &'a W,
    projects: &'a [String],
}

impl<'a, W: Warehouse> MetricsDeriver<'a, W> {
    pub fn new(warehouse: &'a W, projects: &'a [String]) -> Self {
        Self {
            warehouse,
            projects,
        }
    }

    /// Build the aggregation query for a request made at `now`.
    pub fn query(
        &self,
        start_date: NaiveDate,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> AggregationQuery {
        AggregationQuery {
            table: self.warehouse.table().to_string(),
            start_date,
            granularity,
            projects: self.projects.to_vec(),
            as_of: now.date_naive(),
        }
    }

    /// Fetch and derive the records for every tracked project since
    /// `start_date`, ordered by `(period_start, project)`.
    pub async fn derive(
        &self,
        cache: &mut QueryCache,
        start_date: NaiveDate,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> MetricsResult<Vec<DownloadRecord>> {
        if self.projects.is_empty() {
            debug!("no tracked projects, skipping warehouse query");
            return Ok(Vec::new());
        }

        let query = self.query(start_date, granularity, now);
        let sql = query.to_sql(self.warehouse.dialect());

        let rows = match cache.get(&sql, now) {
            Some(rows) => {
                debug!(rows = rows.len(), "query cache hit");
                rows
            }
            None => {
                debug!(%sql, "query cache miss, querying warehouse");
                let rows = self.warehouse.execute(&sql).await?;
                cache.insert(sql, rows.clone(), now);
                rows
            }
        };

        derive_records(rows, granularity, query.as_of)
    }
}

/// Turn raw warehouse rows into ordered records with deltas.
///
/// Dates are normalized and re-truncated, weekly buckets younger than a
/// full week are dropped, and duplicate `(period_start, project)` rows are
/// summed.
pub fn derive_records(
    rows: Vec<RawRow>,
    granularity: Granularity,
    as_of: NaiveDate,
) -> MetricsResult<Vec<DownloadRecord>> {
    let mut buckets: BTreeMap<(NaiveDate, String), u64> = BTreeMap::new();
    let mut incomplete = 0;

    for row in rows {
        let period_start = granularity.truncate(row.period_start.normalize()?);
        if !granularity.is_complete(period_start, as_of) {
            incomplete += 1;
            continue;
        }
        *buckets.entry((period_start, row.project)).or_insert(0) += row.downloads;
    }

    if incomplete > 0 {
        warn!(incomplete, %as_of, "dropped rows for weeks that are still accumulating");
    }

    let mut records: Vec<DownloadRecord> = buckets
        .into_iter()
        .map(|((period_start, project), downloads)| DownloadRecord {
            period_start,
            project,
            downloads,
            delta: 0.0,
        })
        .collect();
    aggregate::compute_deltas(&mut records);
    Ok(records)
}
