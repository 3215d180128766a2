// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and command dispatch.

use crate::{
    aggregate::Granularity,
    charts::AxisScale,
    commands::{self, ChartOptions, ExportFormat},
    config,
    shape::DateInterval,
};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// The time range and bucket size of a derivation.
#[derive(ClapArgs, Debug)]
struct PeriodArgs {
    /// First day of the range (YYYY-MM-DD, not before 2020-01-01)
    #[arg(short, long, default_value = "2020-01-01")]
    start_date: NaiveDate,

    /// Bucket size: 'week' or 'month'
    #[arg(short, long, default_value = "week")]
    granularity: Granularity,
}

#[derive(Parser, Debug)]
enum Command {
    /// Collect daily downloads from pypistats.org into the SQLite warehouse
    Collect,

    /// Print the derived download table
    Report {
        #[command(flatten)]
        period: PeriodArgs,

        /// Only show this package
        #[arg(short, long)]
        project: Option<String>,

        /// Number of most recent periods to show
        #[arg(short = 'n', long, default_value = "12")]
        limit: usize,
    },

    /// Render the trend and comparison charts
    Charts {
        #[command(flatten)]
        period: PeriodArgs,

        /// Output directory for charts
        #[arg(short, long, default_value = "charts")]
        output: Utf8PathBuf,

        /// Packages to compare (defaults to the configured selection; pass
        /// the flag without names to skip the comparison chart)
        #[arg(long, num_args = 0..)]
        packages: Option<Vec<String>>,

        /// Use a logarithmic value axis in the comparison chart
        #[arg(long)]
        log_scale: bool,

        /// Annotate the trend point nearest to this date
        #[arg(long)]
        hover: Option<NaiveDate>,

        /// Start of the date range the bar totals are restricted to
        #[arg(long, requires = "brush_end")]
        brush_start: Option<NaiveDate>,

        /// End of the date range the bar totals are restricted to
        #[arg(long, requires = "brush_start")]
        brush_end: Option<NaiveDate>,

        /// Packages to highlight in the comparison chart
        #[arg(long, num_args = 1..)]
        highlight: Vec<String>,
    },

    /// Export derived records to various formats
    Export {
        #[command(subcommand)]
        export_type: ExportType,
    },

    /// Explore the charts with commands read from stdin
    Interactive {
        /// Output directory for charts
        #[arg(short, long, default_value = "charts")]
        output: Utf8PathBuf,
    },
}

#[derive(Parser, Debug)]
enum ExportType {
    /// Export to CSV format
    Csv {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,

        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Export to JSON format
    Json {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,

        #[command(flatten)]
        period: PeriodArgs,
    },
}

/// Parse arguments and dispatch to the appropriate command.
pub async fn dispatch() -> Result<()> {
    let args = Args::parse();
    let config =
        config::Config::load_or_default(&args.config).context("failed to load configuration")?;

    match args.command {
        Command::Collect => {
            commands::run_collect(&config).await?;
        }
        Command::Report {
            period,
            project,
            limit,
        } => {
            commands::run_report(
                &config,
                period.start_date,
                period.granularity,
                project.as_deref(),
                limit,
            )
            .await?;
        }
        Command::Charts {
            period,
            output,
            packages,
            log_scale,
            hover,
            brush_start,
            brush_end,
            highlight,
        } => {
            let options = ChartOptions {
                start_date: period.start_date,
                granularity: period.granularity,
                packages,
                scale: if log_scale {
                    AxisScale::Log
                } else {
                    AxisScale::Linear
                },
                hover,
                brush: brush_start.zip(brush_end).map(|(a, b)| DateInterval::new(a, b)),
                highlight,
            };
            commands::run_charts(&config, &options, &output).await?;
        }
        Command::Export { export_type } => {
            let (format, output, period) = match export_type {
                ExportType::Csv { output, period } => (ExportFormat::Csv, output, period),
                ExportType::Json { output, period } => (ExportFormat::Json, output, period),
            };
            commands::run_export(&config, format, &output, period.start_date, period.granularity)
                .await?;
        }
        Command::Interactive { output } => {
            commands::run_interactive(&config, &output).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_charts_args() {
        let args = Args::try_parse_from([
            "pypi-download-metrics",
            "charts",
            "--granularity",
            "month",
            "--packages",
            "--brush-start",
            "2024-03-01",
            "--brush-end",
            "2024-01-01",
        ])
        .unwrap();

        match args.command {
            Command::Charts {
                period,
                packages,
                brush_start,
                brush_end,
                log_scale,
                ..
            } => {
                assert_eq!(period.granularity, Granularity::Month);
                assert_eq!(period.start_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
                assert_eq!(packages, Some(Vec::new()));
                assert!(brush_start.is_some() && brush_end.is_some());
                assert!(!log_scale);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_brush_requires_both_ends() {
        let result = Args::try_parse_from([
            "pypi-download-metrics",
            "charts",
            "--brush-start",
            "2024-03-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_granularity_is_rejected() {
        let result = Args::try_parse_from(["pypi-download-metrics", "report", "-g", "day"]);
        assert!(result.is_err());
    }
}
