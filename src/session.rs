// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interactive dashboard session driven by text commands.
//!
//! Each line read from the input is an [`Interaction`] which updates the
//! [`DashboardState`]. The state then tells the loop whether the records have
//! to be derived again or only re-shaped and rendered.

use crate::{
    aggregate::{DownloadRecord, Granularity},
    cache::QueryCache,
    charts::AxisScale,
    config::ProjectsConfig,
    derive::MetricsDeriver,
    error::{MetricsError, MetricsResult},
    shape::{ComparisonSelection, DateInterval},
    warehouse::Warehouse,
};
use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use std::{io::BufRead, str::FromStr};
use tracing::debug;

/// Earliest start date the dashboard accepts.
pub const MIN_START_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2020, 1, 1) {
    Some(date) => date,
    None => panic!("invalid minimum start date"),
};

pub const HELP: &str = "\
Commands:
  start <YYYY-MM-DD>         change the start date
  granularity <week|month>   change the bucket size
  select <pkg>...            set the compared packages (none clears)
  scale <linear|log>         change the comparison value axis
  brush <from> <to>          restrict the bar totals to a date range
  brush clear                remove the date range
  click <pkg>                toggle a package in the category selection
  click clear                clear the category selection
  hover <YYYY-MM-DD>         annotate the trend point nearest a date
  hover clear                remove the annotation
  render                     render the charts again
  help                       show this message
  quit                       leave the session";

/// Check that a start date lies between [`MIN_START_DATE`] and `today`.
pub fn validate_start_date(date: NaiveDate, today: NaiveDate) -> MetricsResult<NaiveDate> {
    if date < MIN_START_DATE || date > today {
        return Err(MetricsError::StartDateOutOfRange {
            date,
            min: MIN_START_DATE,
            max: today,
        });
    }
    Ok(date)
}

fn parse_date(value: &str) -> MetricsResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| MetricsError::InvalidDate(value.to_string()))
}

/// One user interaction with the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Start(NaiveDate),
    Granularity(Granularity),
    Select(Vec<String>),
    Scale(AxisScale),
    Brush(Option<DateInterval>),
    Click(Option<String>),
    Hover(Option<NaiveDate>),
    Render,
    Help,
    Quit,
}

impl FromStr for Interaction {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            bail!("empty command");
        };
        let args: Vec<&str> = words.collect();

        let interaction = match (command, args.as_slice()) {
            ("start", [date]) => Interaction::Start(parse_date(date)?),
            ("granularity", [granularity]) => Interaction::Granularity(granularity.parse()?),
            ("select", names) => Interaction::Select(names.iter().map(|n| n.to_string()).collect()),
            ("scale", [scale]) => Interaction::Scale(scale.parse()?),
            ("brush", ["clear"]) => Interaction::Brush(None),
            ("brush", [from, to]) => {
                Interaction::Brush(Some(DateInterval::new(parse_date(from)?, parse_date(to)?)))
            }
            ("click", ["clear"]) => Interaction::Click(None),
            ("click", [project]) => Interaction::Click(Some(project.to_string())),
            ("hover", ["clear"]) => Interaction::Hover(None),
            ("hover", [date]) => Interaction::Hover(Some(parse_date(date)?)),
            ("render", []) => Interaction::Render,
            ("help", []) => Interaction::Help,
            ("quit" | "exit", []) => Interaction::Quit,
            _ => bail!("unrecognized command '{}'; type 'help' for usage", line.trim()),
        };
        Ok(interaction)
    }
}

/// What has to happen after an interaction was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Nothing,
    /// Shape and render the current records again.
    Render,
    /// Derive the records again, then render.
    Derive,
}

/// Everything the dashboard widgets control.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub start_date: NaiveDate,
    pub granularity: Granularity,
    pub selected: Vec<String>,
    pub scale: AxisScale,
    pub hover: Option<NaiveDate>,
    pub comparison: ComparisonSelection,
    tracked: Vec<String>,
}

impl DashboardState {
    /// Initial state: weekly buckets since [`MIN_START_DATE`] with the
    /// configured default selection.
    pub fn new(projects: &ProjectsConfig) -> Self {
        Self {
            start_date: MIN_START_DATE,
            granularity: Granularity::Week,
            selected: projects.default_selection.clone(),
            scale: AxisScale::Linear,
            hover: None,
            comparison: ComparisonSelection::default(),
            tracked: projects.tracked.clone(),
        }
    }

    /// Apply an interaction made on `today`.
    pub fn apply(&mut self, interaction: Interaction, today: NaiveDate) -> Result<Refresh> {
        let refresh = match interaction {
            Interaction::Start(date) => {
                let date = validate_start_date(date, today)?;
                replace(&mut self.start_date, date, Refresh::Derive)
            }
            Interaction::Granularity(granularity) => {
                replace(&mut self.granularity, granularity, Refresh::Derive)
            }
            Interaction::Select(names) => {
                for name in &names {
                    self.check_tracked(name)?;
                }
                replace(&mut self.selected, names, Refresh::Render)
            }
            Interaction::Scale(scale) => replace(&mut self.scale, scale, Refresh::Render),
            Interaction::Brush(interval) => {
                replace(&mut self.comparison.interval, interval, Refresh::Render)
            }
            Interaction::Click(Some(project)) => {
                self.check_tracked(&project)?;
                self.comparison.toggle_category(&project);
                Refresh::Render
            }
            Interaction::Click(None) => {
                let categories = std::mem::take(&mut self.comparison.categories);
                if categories.is_empty() {
                    Refresh::Nothing
                } else {
                    Refresh::Render
                }
            }
            Interaction::Hover(date) => replace(&mut self.hover, date, Refresh::Render),
            Interaction::Render => Refresh::Render,
            Interaction::Help | Interaction::Quit => Refresh::Nothing,
        };
        Ok(refresh)
    }

    fn check_tracked(&self, project: &str) -> Result<()> {
        if !self.tracked.iter().any(|p| p == project) {
            bail!(
                "unknown package '{}'; tracked packages: {}",
                project,
                self.tracked.join(", ")
            );
        }
        Ok(())
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T, refresh: Refresh) -> Refresh {
    if *slot == value {
        Refresh::Nothing
    } else {
        *slot = value;
        refresh
    }
}

/// Run the session until `quit` or the end of `input`.
///
/// Records are derived through `cache`, so returning to an earlier start
/// date and granularity does not query the warehouse again. Errors are
/// reported and the session carries on with the next interaction.
pub async fn run<W, R, F>(
    deriver: &MetricsDeriver<'_, W>,
    cache: &mut QueryCache,
    mut state: DashboardState,
    input: R,
    mut render: F,
) -> Result<DashboardState>
where
    W: Warehouse,
    R: BufRead,
    F: FnMut(&DashboardState, &[DownloadRecord]) -> Result<()>,
{
    println!("{}", HELP);

    let mut records = match derive(deriver, cache, &state).await {
        Ok(records) => {
            report(render(&state, &records));
            records
        }
        Err(err) => {
            println!("error: {}", err);
            Vec::new()
        }
    };

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let interaction = match line.parse::<Interaction>() {
            Ok(interaction) => interaction,
            Err(err) => {
                println!("error: {:#}", err);
                continue;
            }
        };

        match interaction {
            Interaction::Quit => break,
            Interaction::Help => {
                println!("{}", HELP);
                continue;
            }
            _ => {}
        }

        let refresh = match state.apply(interaction, Utc::now().date_naive()) {
            Ok(refresh) => refresh,
            Err(err) => {
                println!("error: {:#}", err);
                continue;
            }
        };

        match refresh {
            Refresh::Nothing => {}
            Refresh::Render => report(render(&state, &records)),
            Refresh::Derive => match derive(deriver, cache, &state).await {
                Ok(derived) => {
                    records = derived;
                    report(render(&state, &records));
                }
                Err(err) => println!("error: {}", err),
            },
        }
    }

    Ok(state)
}

async fn derive<W: Warehouse>(
    deriver: &MetricsDeriver<'_, W>,
    cache: &mut QueryCache,
    state: &DashboardState,
) -> MetricsResult<Vec<DownloadRecord>> {
    let now = Utc::now();
    let purged = cache.purge_expired(now);
    if purged > 0 {
        debug!(purged, "dropped expired query results");
    }
    deriver
        .derive(cache, state.start_date, state.granularity, now)
        .await
}

fn report(result: Result<()>) {
    if let Err(err) = result {
        println!("error: {:#}", err);
    }
}
