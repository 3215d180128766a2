// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.

use crate::{
    aggregate::{DownloadRecord, Granularity},
    bigquery::BigQueryClient,
    cache::QueryCache,
    charts::{self, AxisScale},
    config::{Config, WarehouseSource},
    db::{self, SqliteWarehouse},
    derive::MetricsDeriver,
    export, pypistats,
    session::{self, DashboardState, Interaction},
    shape::{self, DateInterval},
    warehouse::AnyWarehouse,
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::BufWriter,
};
use tracing::info;

/// Open the warehouse selected by the configuration.
pub fn open_warehouse(source: &WarehouseSource) -> Result<AnyWarehouse> {
    match source {
        WarehouseSource::Sqlite { path } => {
            info!(%path, "using SQLite warehouse");
            let warehouse = SqliteWarehouse::open(path).context("failed to open database")?;
            Ok(AnyWarehouse::Sqlite(warehouse))
        }
        WarehouseSource::Bigquery {
            project,
            table,
            token_env,
            location,
        } => {
            info!(%project, %table, "using BigQuery warehouse");
            let client =
                BigQueryClient::from_env(project.clone(), table.clone(), location.clone(), token_env)?;
            Ok(AnyWarehouse::BigQuery(client))
        }
    }
}

/// Run the collect command.
pub async fn run_collect(config: &Config) -> Result<()> {
    let WarehouseSource::Sqlite { path } = &config.warehouse else {
        anyhow::bail!("collect only fills a SQLite warehouse; set [warehouse] kind = \"sqlite\"");
    };

    println!("Initializing database at {}", path);
    let conn = db::init_db(path).context("failed to initialize database")?;

    println!("\nCollecting pypistats.org statistics...");
    for package in &config.projects.tracked {
        println!("  {}", package);
        collect_package(&conn, package).await?;
    }

    println!("\nCollection complete.");
    Ok(())
}

async fn collect_package(conn: &Connection, package: &str) -> Result<()> {
    let previous = db::latest_download_date(conn, package)?;

    let response = pypistats::fetch_overall(package)
        .await
        .with_context(|| format!("failed to fetch downloads for '{}'", package))?;
    let inserted = store_overall(conn, &response)?;

    let latest = db::latest_download_date(conn, package)?;
    match (previous, latest) {
        (Some(previous), Some(latest)) if latest > previous => {
            println!("    Inserted {} daily records (new through {})", inserted, latest)
        }
        (None, Some(latest)) => println!("    Inserted {} daily records (through {})", inserted, latest),
        _ => println!("    Inserted {} daily records (no new days)", inserted),
    }
    Ok(())
}

/// Upsert the mirror-free daily downloads of a response.
fn store_overall(conn: &Connection, response: &pypistats::OverallResponse) -> Result<usize> {
    let mut records_inserted = 0;
    for day in response.without_mirrors() {
        let date = pypistats::parse_date(&day.date)?;
        db::insert_daily_download(conn, date, &response.package, day.downloads)?;
        records_inserted += 1;
    }
    Ok(records_inserted)
}

async fn derive_records(
    config: &Config,
    start_date: NaiveDate,
    granularity: Granularity,
) -> Result<Vec<DownloadRecord>> {
    let today = Utc::now().date_naive();
    session::validate_start_date(start_date, today)?;

    let warehouse = open_warehouse(&config.warehouse)?;
    let deriver = MetricsDeriver::new(&warehouse, &config.projects.tracked);
    let mut cache = QueryCache::with_ttl_hours(config.cache.ttl_hours);
    let records = deriver
        .derive(&mut cache, start_date, granularity, Utc::now())
        .await
        .context("failed to derive download metrics")?;
    Ok(records)
}

/// Run the report command.
pub async fn run_report(
    config: &Config,
    start_date: NaiveDate,
    granularity: Granularity,
    project: Option<&str>,
    limit: usize,
) -> Result<()> {
    let all = derive_records(config, start_date, granularity).await?;
    let records = match project {
        Some(project) => shape::single_series(&all, project),
        None => all.clone(),
    };

    let shown = latest_periods(&records, limit);
    if shown.is_empty() {
        println!("No {} downloads since {}.", granularity.adjective(), start_date);
        if project.is_some() {
            let present = shape::projects_present(&all);
            if !present.is_empty() {
                println!("Packages with data: {}", present.join(", "));
            }
        }
        return Ok(());
    }

    println!(
        "\n{:<12} {:<16} {:>15} {:>10}",
        "Period", "Project", "Downloads", "Change"
    );
    println!("{}", "=".repeat(56));
    for record in shown {
        println!(
            "{:<12} {:<16} {:>15} {:>10}",
            record.period_start.to_string(),
            record.project,
            charts::format_number(record.downloads),
            charts::format_percent(record.delta)
        );
    }
    Ok(())
}

/// Records in the `limit` most recent periods.
fn latest_periods(records: &[DownloadRecord], limit: usize) -> &[DownloadRecord] {
    let periods: BTreeSet<NaiveDate> = records.iter().map(|r| r.period_start).collect();
    let Some(&first) = periods.iter().rev().take(limit).last() else {
        return &[];
    };
    let skip = records.partition_point(|r| r.period_start < first);
    &records[skip..]
}

/// Options of the charts command.
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub start_date: NaiveDate,
    pub granularity: Granularity,
    /// Packages to compare; `None` uses the configured default selection.
    pub packages: Option<Vec<String>>,
    pub scale: AxisScale,
    pub hover: Option<NaiveDate>,
    pub brush: Option<DateInterval>,
    pub highlight: Vec<String>,
}

impl ChartOptions {
    /// The dashboard state these options describe.
    fn to_state(&self, config: &Config, today: NaiveDate) -> Result<DashboardState> {
        let mut state = DashboardState::new(&config.projects);
        let mut interactions = vec![
            Interaction::Start(self.start_date),
            Interaction::Granularity(self.granularity),
            Interaction::Scale(self.scale),
            Interaction::Hover(self.hover),
            Interaction::Brush(self.brush),
        ];
        if let Some(packages) = &self.packages {
            interactions.push(Interaction::Select(packages.clone()));
        }
        interactions.extend(
            self.highlight
                .iter()
                .map(|project| Interaction::Click(Some(project.clone()))),
        );

        for interaction in interactions {
            state.apply(interaction, today)?;
        }
        Ok(state)
    }
}

/// Run the charts command.
pub async fn run_charts(config: &Config, options: &ChartOptions, output_dir: &Utf8Path) -> Result<()> {
    let state = options.to_state(config, Utc::now().date_naive())?;
    let records = derive_records(config, state.start_date, state.granularity).await?;

    println!("Generating charts in {}", output_dir);
    render_views(&state, &records, &config.projects.featured, output_dir)?;
    Ok(())
}

/// Render the trend view of the featured package and the comparison view
/// of the selected ones.
pub fn render_views(
    state: &DashboardState,
    records: &[DownloadRecord],
    featured: &str,
    output_dir: &Utf8Path,
) -> Result<()> {
    fs::create_dir_all(output_dir.as_std_path())
        .with_context(|| format!("failed to create output directory {}", output_dir))?;

    let series = shape::single_series(records, featured);
    if series.is_empty() {
        println!("No downloads for {}; skipping trend chart.", featured);
    } else {
        let title = format!("{} ({} downloads)", featured, state.granularity.adjective());
        charts::render_trend(&series, &title, state.hover, &output_dir.join("trend.png"))?;
    }

    match shape::comparison(records, &state.selected) {
        None => println!("No packages selected; skipping comparison chart."),
        Some(rows) => {
            let panels = shape::link_panels(&rows, &state.comparison);
            if panels.is_empty() {
                println!("No downloads for the selected packages; skipping comparison chart.");
            } else {
                charts::render_comparison(
                    &panels,
                    state.scale,
                    state.comparison.interval,
                    state.hover,
                    &output_dir.join("comparison.png"),
                )?;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Run the export command.
pub async fn run_export(
    config: &Config,
    format: ExportFormat,
    output: &Utf8Path,
    start_date: NaiveDate,
    granularity: Granularity,
) -> Result<()> {
    let records = derive_records(config, start_date, granularity).await?;

    let file = File::create(output.as_std_path())
        .with_context(|| format!("failed to create output file {}", output))?;
    let writer = BufWriter::new(file);
    match format {
        ExportFormat::Csv => export::write_csv(&records, writer)?,
        ExportFormat::Json => export::write_json(&records, writer)?,
    }

    println!("Exported {} records to {}.", records.len(), output);
    Ok(())
}

/// Run the interactive command on stdin.
pub async fn run_interactive(config: &Config, output_dir: &Utf8Path) -> Result<()> {
    let warehouse = open_warehouse(&config.warehouse)?;
    let deriver = MetricsDeriver::new(&warehouse, &config.projects.tracked);
    let mut cache = QueryCache::with_ttl_hours(config.cache.ttl_hours);
    if !cache.is_enabled() {
        info!("query cache disabled, every change queries the warehouse");
    }
    let state = DashboardState::new(&config.projects);
    let featured = config.projects.featured.as_str();

    println!("Rendering charts to {}", output_dir);
    let stdin = std::io::stdin();
    session::run(&deriver, &mut cache, state, stdin.lock(), |state, records| {
        render_views(state, records, featured, output_dir)
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricsError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(period_start: NaiveDate, project: &str) -> DownloadRecord {
        DownloadRecord {
            period_start,
            project: project.to_string(),
            downloads: 1,
            delta: 0.0,
        }
    }

    #[test]
    fn test_latest_periods() {
        let records = vec![
            record(date(2024, 1, 1), "keras"),
            record(date(2024, 1, 1), "pandas"),
            record(date(2024, 2, 1), "pandas"),
            record(date(2024, 3, 1), "keras"),
            record(date(2024, 3, 1), "pandas"),
        ];

        let shown = latest_periods(&records, 2);
        assert_eq!(shown, &records[2..]);
        assert_eq!(latest_periods(&records, 10), &records[..]);
        assert!(latest_periods(&records, 0).is_empty());
        assert!(latest_periods(&[], 3).is_empty());
    }

    #[test]
    fn test_store_overall() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();

        let response: pypistats::OverallResponse = serde_json::from_str(
            r#"{
                "data": [
                    {"category": "with_mirrors", "date": "2024-03-01", "downloads": 90},
                    {"category": "without_mirrors", "date": "2024-03-01", "downloads": 80},
                    {"category": "without_mirrors", "date": "2024-03-02", "downloads": 70}
                ],
                "package": "numpy"
            }"#,
        )
        .unwrap();

        assert_eq!(store_overall(&conn, &response).unwrap(), 2);
        // Upserting the same days again does not duplicate them.
        assert_eq!(store_overall(&conn, &response).unwrap(), 2);

        let total: i64 = conn
            .query_row("SELECT SUM(downloads) FROM pypi_downloads", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 150);
        assert_eq!(
            db::latest_download_date(&conn, "numpy").unwrap(),
            Some(date(2024, 3, 2))
        );
    }

    fn options() -> ChartOptions {
        ChartOptions {
            start_date: date(2024, 1, 1),
            granularity: Granularity::Month,
            packages: None,
            scale: AxisScale::Log,
            hover: Some(date(2024, 2, 1)),
            brush: None,
            highlight: vec!["keras".to_string()],
        }
    }

    #[test]
    fn test_chart_options_to_state() {
        let config = Config::default();
        let state = options().to_state(&config, date(2026, 10, 17)).unwrap();

        assert_eq!(state.start_date, date(2024, 1, 1));
        assert_eq!(state.granularity, Granularity::Month);
        assert_eq!(state.selected, vec!["pandas", "keras"]);
        assert_eq!(state.scale, AxisScale::Log);
        assert_eq!(state.hover, Some(date(2024, 2, 1)));
        assert!(state.comparison.categories.contains("keras"));

        let empty = ChartOptions {
            packages: Some(Vec::new()),
            ..options()
        };
        assert!(empty.to_state(&config, date(2026, 10, 17)).unwrap().selected.is_empty());
    }

    #[test]
    fn test_chart_options_reject_early_start() {
        let options = ChartOptions {
            start_date: date(2019, 6, 1),
            ..options()
        };
        let err = options.to_state(&Config::default(), date(2026, 10, 17)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MetricsError>(),
            Some(MetricsError::StartDateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_render_views_skips_empty_selection() {
        let dir = std::env::temp_dir().join(format!("pypi-metrics-{}", std::process::id()));
        let output_dir = camino::Utf8PathBuf::try_from(dir).unwrap();

        let mut state = DashboardState::new(&Config::default().projects);
        state.selected.clear();
        // No records: neither chart is drawn, and nothing fails.
        render_views(&state, &[], "pandas", &output_dir).unwrap();
        assert!(!output_dir.join("comparison.png").exists());

        fs::remove_dir_all(output_dir.as_std_path()).unwrap();
    }
}
