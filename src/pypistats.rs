// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! pypistats.org API client for fetching daily PyPI downloads.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

const PYPISTATS_API_BASE: &str = "https://pypistats.org/api";

/// Category of the overall endpoint that excludes PyPI mirrors.
pub const WITHOUT_MIRRORS: &str = "without_mirrors";

#[derive(Debug, Deserialize)]
pub struct OverallResponse {
    pub package: String,
    pub data: Vec<DailyDownloads>,
}

#[derive(Debug, Deserialize)]
pub struct DailyDownloads {
    pub category: String,
    pub date: String, // YYYY-MM-DD format
    pub downloads: u64,
}

impl OverallResponse {
    /// Daily downloads excluding mirrors.
    pub fn without_mirrors(&self) -> impl Iterator<Item = &DailyDownloads> {
        self.data.iter().filter(|d| d.category == WITHOUT_MIRRORS)
    }
}

/// Fetch daily downloads of a package.
///
/// Note: pypistats.org only keeps roughly the last 180 days.
pub async fn fetch_overall(package: &str) -> Result<OverallResponse> {
    let url = format!("{}/packages/{}/overall", PYPISTATS_API_BASE, package);

    let client = reqwest::Client::new();
    let response = client
        .get(&url)
        .query(&[("mirrors", "false")])
        .header("User-Agent", "pypi-download-metrics")
        .send()
        .await
        .with_context(|| format!("failed to fetch downloads for package '{}'", package))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "pypistats.org API request failed with status {} for package '{}': {}",
            status,
            package,
            body
        );
    }

    let downloads = response
        .json::<OverallResponse>()
        .await
        .context("failed to parse pypistats.org API response")?;

    Ok(downloads)
}

/// Parse a date string from pypistats.org (YYYY-MM-DD format).
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("failed to parse date '{}'", date_str))
}
