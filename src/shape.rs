// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slicing derived records into the trend and comparison views.

use crate::aggregate::DownloadRecord;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Records of a single project, in their original order.
pub fn single_series(records: &[DownloadRecord], project: &str) -> Vec<DownloadRecord> {
    records
        .iter()
        .filter(|r| r.project == project)
        .cloned()
        .collect()
}

/// Records of the selected projects, in their original order.
///
/// Returns `None` when nothing is selected: there is no comparison chart to
/// draw, which is different from a selection that matched no rows.
pub fn comparison(records: &[DownloadRecord], selected: &[String]) -> Option<Vec<DownloadRecord>> {
    if selected.is_empty() {
        return None;
    }
    let selected: HashSet<&str> = selected.iter().map(String::as_str).collect();
    Some(
        records
            .iter()
            .filter(|r| selected.contains(r.project.as_str()))
            .cloned()
            .collect(),
    )
}

/// Distinct project names in order of first appearance.
pub fn projects_present(records: &[DownloadRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.project.as_str()))
        .map(|r| r.project.clone())
        .collect()
}

/// The point of a series closest in time to `at`; ties go to the earlier
/// point.
pub fn nearest_point(series: &[DownloadRecord], at: NaiveDate) -> Option<&DownloadRecord> {
    series
        .iter()
        .min_by_key(|r| ((r.period_start - at).num_days().abs(), r.period_start))
}

/// Direction of a period-over-period change, used to colour trend points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSign {
    Gain,
    Loss,
}

impl DeltaSign {
    pub fn of(delta: f64) -> Self {
        if delta < 0.0 {
            DeltaSign::Loss
        } else {
            DeltaSign::Gain
        }
    }
}

/// An inclusive range of dates selected by brushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    /// Build an interval from two endpoints in either order.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// User selections on the comparison view.
///
/// Empty selections mean "everything": no interval keeps every period and no
/// categories keeps every project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonSelection {
    pub interval: Option<DateInterval>,
    pub categories: BTreeSet<String>,
}

impl ComparisonSelection {
    /// Add a project to the category selection, or remove it if present.
    pub fn toggle_category(&mut self, project: &str) {
        if !self.categories.remove(project) {
            self.categories.insert(project.to_string());
        }
    }

    fn includes_category(&self, project: &str) -> bool {
        self.categories.is_empty() || self.categories.contains(project)
    }
}

/// Per-project total shown as one bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTotal {
    pub project: String,
    pub downloads: u64,
    pub highlighted: bool,
}

/// Data for the two linked panels of the comparison view.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPanels {
    /// Time series for the line panel, filtered by the category selection.
    pub lines: Vec<DownloadRecord>,
    /// Totals inside the brushed interval, one per project, sorted by name.
    pub bars: Vec<ProjectTotal>,
}

impl ComparisonPanels {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.bars.is_empty()
    }
}

/// Apply the comparison selections: categories filter the line panel and
/// highlight bars, the interval filters the bar panel.
pub fn link_panels(records: &[DownloadRecord], selection: &ComparisonSelection) -> ComparisonPanels {
    let lines = records
        .iter()
        .filter(|r| selection.includes_category(&r.project))
        .cloned()
        .collect();

    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for record in records {
        let in_interval = selection
            .interval
            .is_none_or(|interval| interval.contains(record.period_start));
        let total = totals.entry(record.project.as_str()).or_insert(0);
        if in_interval {
            *total += record.downloads;
        }
    }

    let bars = totals
        .into_iter()
        .map(|(project, downloads)| ProjectTotal {
            project: project.to_string(),
            downloads,
            highlighted: selection.includes_category(project),
        })
        .collect();

    ComparisonPanels { lines, bars }
}
