// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local SQLite warehouse of daily PyPI download counts.

use crate::{
    error::WarehouseError,
    query::Dialect,
    warehouse::{RawDate, RawRow, Warehouse},
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::NaiveDate;
use rusqlite::{Connection, params};

/// Table holding one row per (date, project).
pub const DOWNLOADS_TABLE: &str = "pypi_downloads";

/// Open the database file and initialize its schema.
pub fn init_db(path: &Utf8Path) -> Result<Connection> {
    let conn = Connection::open(path.as_std_path())
        .with_context(|| format!("failed to open database at {}", path))?;

    // journal_mode and synchronous persist in the file; the rest are
    // per-connection.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -64000;
        PRAGMA mmap_size = 134217728;
        PRAGMA temp_store = MEMORY;
        "#,
    )
    .context("failed to set database pragmas")?;

    init_schema(&conn)?;
    Ok(conn)
}

/// Create the downloads table if it does not exist.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Daily downloads per project (native time-series)
        CREATE TABLE IF NOT EXISTS pypi_downloads (
            date TEXT NOT NULL,              -- ISO8601 date (YYYY-MM-DD)
            project TEXT NOT NULL,
            downloads INTEGER NOT NULL,
            PRIMARY KEY (date, project)
        ) WITHOUT ROWID;

        CREATE INDEX IF NOT EXISTS idx_downloads_project ON pypi_downloads(project, date);
        "#,
    )
    .context("failed to initialize database schema")?;
    Ok(())
}

/// Insert or replace the download count of one project on one day.
pub fn insert_daily_download(
    conn: &Connection,
    date: NaiveDate,
    project: &str,
    downloads: u64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pypi_downloads (date, project, downloads)
         VALUES (?1, ?2, ?3)",
        params![date.to_string(), project, downloads as i64],
    )
    .context("failed to insert daily download")?;
    Ok(())
}

/// Get the latest date for which we have downloads of a project.
pub fn latest_download_date(conn: &Connection, project: &str) -> Result<Option<NaiveDate>> {
    let mut stmt = conn.prepare("SELECT MAX(date) FROM pypi_downloads WHERE project = ?1")?;
    let result: Option<String> = stmt.query_row([project], |row| row.get(0))?;

    match result {
        Some(date_str) => {
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .context("failed to parse date from database")?;
            Ok(Some(date))
        }
        None => Ok(None),
    }
}

/// A SQLite database used as the warehouse.
pub struct SqliteWarehouse {
    conn: Connection,
}

impl SqliteWarehouse {
    pub fn open(path: &Utf8Path) -> Result<Self> {
        Ok(Self {
            conn: init_db(path)?,
        })
    }

    /// Wrap a connection whose schema is already initialized.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn table(&self) -> &str {
        DOWNLOADS_TABLE
    }

    async fn execute(&self, sql: &str) -> Result<Vec<RawRow>, WarehouseError> {
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() != 3 {
            return Err(WarehouseError::MalformedRow(format!(
                "expected 3 columns, query returned {}",
                stmt.column_count()
            )));
        }

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (period_start, project, downloads) = row?;
            let downloads = u64::try_from(downloads).map_err(|_| {
                WarehouseError::MalformedRow(format!(
                    "negative download count {} for '{}' on {}",
                    downloads, project, period_start
                ))
            })?;
            result.push(RawRow {
                period_start: RawDate::Text(period_start),
                project,
                downloads,
            });
        }
        Ok(result)
    }
}
