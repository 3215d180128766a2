// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chart rendering for the trend and comparison views.

use crate::{
    aggregate::DownloadRecord,
    error::MetricsError,
    shape::{self, ComparisonPanels, DateInterval, DeltaSign, ProjectTotal},
};
use anyhow::Result;
use camino::Utf8Path;
use chrono::{Duration, NaiveDate};
use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use std::{collections::BTreeMap, fmt, str::FromStr};

const CHART_WIDTH: u32 = 1600;
const CHART_HEIGHT: u32 = 900;

// Typography
const FONT_FAMILY: &str = "sans-serif";
const TITLE_SIZE: i32 = 24;
const LABEL_SIZE: i32 = 16;
const AXIS_SIZE: i32 = 14;

// Colors - Modern, minimal palette
const BACKGROUND: RGBColor = RGBColor(250, 250, 252); // Off-white
const TEXT_PRIMARY: RGBColor = RGBColor(15, 23, 42); // Slate 900
const TEXT_SECONDARY: RGBColor = RGBColor(100, 116, 139); // Slate 500
const GRID_COLOR: RGBColor = RGBColor(226, 232, 240); // Slate 200
const ACCENT_BLUE: RGBColor = RGBColor(59, 130, 246); // Blue 500
const ACCENT_GREEN: RGBColor = RGBColor(34, 197, 94); // Green 500
const ACCENT_RED: RGBColor = RGBColor(239, 68, 68); // Red 500

// One colour per project, assigned in name order.
const PALETTE: [RGBColor; 6] = [
    RGBColor(99, 102, 241),  // Indigo
    RGBColor(59, 130, 246),  // Blue
    RGBColor(34, 197, 94),   // Green
    RGBColor(251, 146, 60),  // Orange
    RGBColor(236, 72, 153),  // Pink
    RGBColor(156, 163, 175), // Gray
];

/// Scale of the value axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisScale {
    #[default]
    Linear,
    Log,
}

impl AxisScale {
    /// Map a download count onto the plotted axis.
    pub fn project(self, value: f64) -> f64 {
        match self {
            AxisScale::Linear => value,
            // Counts below 1 have no useful logarithm; pin them to the axis.
            AxisScale::Log if value < 1.0 => 0.0,
            AxisScale::Log => value.log10(),
        }
    }

    /// Map an axis position back onto a download count.
    pub fn unproject(self, position: f64) -> f64 {
        match self {
            AxisScale::Linear => position,
            AxisScale::Log => 10f64.powf(position),
        }
    }

    /// Upper end of the axis for a maximum count, with headroom.
    fn axis_max(self, max: f64) -> f64 {
        (self.project(max) * 1.1).max(1.0)
    }
}

impl fmt::Display for AxisScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisScale::Linear => f.write_str("linear"),
            AxisScale::Log => f.write_str("log"),
        }
    }
}

impl FromStr for AxisScale {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(AxisScale::Linear),
            "log" | "logarithmic" => Ok(AxisScale::Log),
            _ => Err(MetricsError::InvalidAxisScale(s.to_string())),
        }
    }
}

/// Create a styled drawing area with background.
fn create_drawing_area(
    output_path: &Utf8Path,
) -> Result<DrawingArea<BitMapBackend<'_>, Shift>> {
    let root = BitMapBackend::new(output_path.as_std_path(), (CHART_WIDTH, CHART_HEIGHT))
        .into_drawing_area();
    root.fill(&BACKGROUND)?;
    Ok(root)
}

/// Configure common mesh styling for date-based charts.
fn configure_date_mesh<DB: DrawingBackend>(
    chart: &mut ChartContext<DB, Cartesian2d<RangedDate<NaiveDate>, RangedCoordf64>>,
    scale: AxisScale,
) -> Result<()>
where
    <DB as DrawingBackend>::ErrorType: 'static,
{
    chart
        .configure_mesh()
        .bold_line_style(&GRID_COLOR.mix(0.3))
        .light_line_style(&TRANSPARENT)
        .x_labels(8)
        .y_labels(6)
        .x_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .y_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .x_label_formatter(&|date: &NaiveDate| date.format("%Y-%m-%d").to_string())
        .y_label_formatter(&|y: &f64| format_number(scale.unproject(*y).round() as u64))
        .disable_x_mesh()
        .draw()?;
    Ok(())
}

/// First and last period of a series, widened to a one-day range when they
/// coincide.
fn date_bounds(records: &[DownloadRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let min = records.iter().map(|r| r.period_start).min()?;
    let max = records.iter().map(|r| r.period_start).max()?;
    if min == max {
        Some((min, max + Duration::days(1)))
    } else {
        Some((min, max))
    }
}

fn delta_color(delta: f64) -> RGBColor {
    match DeltaSign::of(delta) {
        DeltaSign::Gain => ACCENT_GREEN,
        DeltaSign::Loss => ACCENT_RED,
    }
}

/// Text shown next to a hovered point.
pub fn tooltip_text(record: &DownloadRecord) -> String {
    format!(
        "{}  {} downloads  {}",
        record.period_start.format("%Y-%m-%d"),
        format_number(record.downloads),
        format_percent(record.delta)
    )
}

/// Render the single-project trend chart.
///
/// Points are coloured by the sign of their delta; the point nearest to
/// `hover` is enlarged and annotated.
pub fn render_trend(
    series: &[DownloadRecord],
    title: &str,
    hover: Option<NaiveDate>,
    output_path: &Utf8Path,
) -> Result<()> {
    let Some((min_date, max_date)) = date_bounds(series) else {
        return Ok(());
    };

    let root = create_drawing_area(output_path)?;

    let max_downloads = series.iter().map(|r| r.downloads).max().unwrap_or(0);
    let y_max = AxisScale::Linear.axis_max(max_downloads as f64);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY))
        .margin(60)
        .x_label_area_size(70)
        .y_label_area_size(100)
        .build_cartesian_2d(min_date..max_date, 0f64..y_max)?;

    configure_date_mesh(&mut chart, AxisScale::Linear)?;

    let points: Vec<(NaiveDate, f64)> = series
        .iter()
        .map(|r| (r.period_start, r.downloads as f64))
        .collect();

    chart.draw_series(AreaSeries::new(
        points.iter().copied(),
        0.0,
        ACCENT_BLUE.mix(0.1),
    ))?;

    chart.draw_series(LineSeries::new(
        points.iter().copied(),
        ShapeStyle {
            color: ACCENT_BLUE.to_rgba(),
            filled: true,
            stroke_width: 3,
        },
    ))?;

    chart.draw_series(series.iter().map(|r| {
        Circle::new(
            (r.period_start, r.downloads as f64),
            4,
            delta_color(r.delta).filled(),
        )
    }))?;

    if let Some(point) = hover.and_then(|at| shape::nearest_point(series, at)) {
        let position = (point.period_start, point.downloads as f64);
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(point.period_start, 0.0), (point.period_start, y_max)],
            GRID_COLOR.stroke_width(2),
        )))?;
        chart.draw_series(std::iter::once(Circle::new(
            position,
            9,
            delta_color(point.delta).filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            tooltip_text(point),
            position,
            (FONT_FAMILY, LABEL_SIZE).into_font().color(&TEXT_PRIMARY),
        )))?;
    }

    root.present()?;
    println!("  • {}", output_path);
    Ok(())
}

/// Text shown next to a hovered point of one line in the comparison view.
pub fn comparison_tooltip_text(record: &DownloadRecord) -> String {
    format!("{}  {}", record.project, tooltip_text(record))
}

/// Text drawn at the end of a bar.
pub fn bar_label(bar: &ProjectTotal) -> String {
    format!("{} downloads", format_number(bar.downloads))
}

/// Render the comparison view: a line panel over a bar panel.
///
/// Each line's point nearest to `hover` is annotated, and every bar is
/// labelled with its total.
pub fn render_comparison(
    panels: &ComparisonPanels,
    scale: AxisScale,
    interval: Option<DateInterval>,
    hover: Option<NaiveDate>,
    output_path: &Utf8Path,
) -> Result<()> {
    if panels.is_empty() {
        return Ok(());
    }

    let palette = project_palette(panels);
    let root = create_drawing_area(output_path)?;
    let (upper, lower) = root.split_vertically((CHART_HEIGHT * 3 / 5) as i32);

    draw_lines_panel(&upper, panels, scale, interval, hover, &palette)?;
    draw_bars_panel(&lower, panels, scale, &palette)?;

    root.present()?;
    println!("  • {}", output_path);
    Ok(())
}

fn project_palette(panels: &ComparisonPanels) -> BTreeMap<&str, RGBColor> {
    let mut names: Vec<&str> = panels
        .bars
        .iter()
        .map(|b| b.project.as_str())
        .chain(panels.lines.iter().map(|r| r.project.as_str()))
        .collect();
    names.sort_unstable();
    names.dedup();
    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name, PALETTE[idx % PALETTE.len()]))
        .collect()
}

fn draw_lines_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panels: &ComparisonPanels,
    scale: AxisScale,
    interval: Option<DateInterval>,
    hover: Option<NaiveDate>,
    palette: &BTreeMap<&str, RGBColor>,
) -> Result<()>
where
    <DB as DrawingBackend>::ErrorType: 'static,
{
    let Some((min_date, max_date)) = date_bounds(&panels.lines) else {
        return Ok(());
    };

    let max_downloads = panels.lines.iter().map(|r| r.downloads).max().unwrap_or(0);
    let y_max = scale.axis_max(max_downloads as f64);

    let mut chart = ChartBuilder::on(area)
        .caption(
            format!("Downloads over time ({} scale)", scale),
            (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY),
        )
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(100)
        .build_cartesian_2d(min_date..max_date, 0f64..y_max)?;

    configure_date_mesh(&mut chart, scale)?;

    // Shade the brushed interval, clipped to the plotted dates.
    if let Some(interval) = interval {
        let start = interval.start.max(min_date);
        let end = interval.end.min(max_date);
        if start <= end {
            chart.draw_series(std::iter::once(Rectangle::new(
                [(start, 0.0), (end, y_max)],
                ACCENT_BLUE.mix(0.08).filled(),
            )))?;
        }
    }

    let mut series_by_project: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for record in &panels.lines {
        series_by_project
            .entry(record.project.as_str())
            .or_default()
            .push((record.period_start, scale.project(record.downloads as f64)));
    }

    for (project, points) in &series_by_project {
        let color = palette.get(project).copied().unwrap_or(TEXT_SECONDARY);
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(*project)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, color.filled())))?;

        let series = shape::single_series(&panels.lines, project);
        if let Some(point) = hover.and_then(|at| shape::nearest_point(&series, at)) {
            let position = (point.period_start, scale.project(point.downloads as f64));
            chart.draw_series(std::iter::once(Circle::new(position, 7, color.filled())))?;
            chart.draw_series(std::iter::once(Text::new(
                comparison_tooltip_text(point),
                position,
                (FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_PRIMARY),
            )))?;
        }
    }

    chart
        .configure_series_labels()
        .label_font((FONT_FAMILY, LABEL_SIZE).into_font().color(&TEXT_PRIMARY))
        .background_style(&BACKGROUND)
        .border_style(&GRID_COLOR)
        .margin(15)
        .draw()?;

    Ok(())
}

fn draw_bars_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panels: &ComparisonPanels,
    scale: AxisScale,
    palette: &BTreeMap<&str, RGBColor>,
) -> Result<()>
where
    <DB as DrawingBackend>::ErrorType: 'static,
{
    if panels.bars.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = panels.bars.iter().map(|b| b.project.as_str()).collect();
    let max_downloads = panels.bars.iter().map(|b| b.downloads).max().unwrap_or(0);
    let x_max = scale.axis_max(max_downloads as f64);

    let mut chart = ChartBuilder::on(area)
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(140)
        .build_cartesian_2d(0f64..x_max, (0..names.len() as i32).into_segmented())?;

    chart
        .configure_mesh()
        .bold_line_style(&GRID_COLOR.mix(0.3))
        .light_line_style(&TRANSPARENT)
        .disable_y_mesh()
        .x_labels(6)
        .y_labels(names.len())
        .x_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .y_label_style((FONT_FAMILY, LABEL_SIZE).into_font().color(&TEXT_PRIMARY))
        .x_label_formatter(&|x: &f64| format_number(scale.unproject(*x).round() as u64))
        .y_label_formatter(&|y: &SegmentValue<i32>| segment_label(y, &names))
        .draw()?;

    chart.draw_series(panels.bars.iter().enumerate().map(|(idx, bar)| {
        let color = palette
            .get(bar.project.as_str())
            .copied()
            .unwrap_or(TEXT_SECONDARY);
        let style = if bar.highlighted {
            color.filled()
        } else {
            color.mix(0.25).filled()
        };
        let idx = idx as i32;
        let mut rect = Rectangle::new(
            [
                (0.0, SegmentValue::Exact(idx)),
                (scale.project(bar.downloads as f64), SegmentValue::Exact(idx + 1)),
            ],
            style,
        );
        rect.set_margin(6, 6, 0, 0);
        rect
    }))?;

    chart.draw_series(panels.bars.iter().enumerate().map(|(idx, bar)| {
        Text::new(
            bar_label(bar),
            (scale.project(bar.downloads as f64), SegmentValue::CenterOf(idx as i32)),
            (FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_PRIMARY),
        )
    }))?;

    Ok(())
}

fn segment_label(value: &SegmentValue<i32>, names: &[&str]) -> String {
    match value {
        SegmentValue::Exact(idx) | SegmentValue::CenterOf(idx) => usize::try_from(*idx)
            .ok()
            .and_then(|idx| names.get(idx))
            .map(|name| name.to_string())
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    }
}

/// Format a number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

/// Format a fractional change as a percentage with two decimals.
pub fn format_percent(delta: f64) -> String {
    format!("{:.2}%", delta * 100.0)
}
