// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Export of derived records to CSV and JSON.

use crate::aggregate::DownloadRecord;
use anyhow::Result;
use std::io::Write;

const CSV_HEADER: [&str; 4] = ["period_start", "project", "downloads", "delta"];

/// Write records as CSV, one row per `(period_start, project)`.
pub fn write_csv(records: &[DownloadRecord], mut writer: impl Write) -> Result<()> {
    writeln!(writer, "{}", CSV_HEADER.join(","))?;

    for record in records {
        let values = [
            record.period_start.to_string(),
            csv_field(&record.project),
            record.downloads.to_string(),
            record.delta.to_string(),
        ];
        writeln!(writer, "{}", values.join(","))?;
    }

    writer.flush()?;
    Ok(())
}

/// Write records as a pretty-printed JSON array.
pub fn write_json(records: &[DownloadRecord], mut writer: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
