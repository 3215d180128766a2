// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation query construction for each supported SQL dialect.

use crate::aggregate::{COMPLETE_WEEK_DAYS, Granularity};
use chrono::NaiveDate;

/// SQL dialects the query builder can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    BigQuery,
    Sqlite,
}

/// Sum of daily downloads per (period, project) since a start date.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub table: String,
    pub start_date: NaiveDate,
    pub granularity: Granularity,
    pub projects: Vec<String>,
    /// Date that weekly completeness is measured against.
    pub as_of: NaiveDate,
}

impl AggregationQuery {
    /// Render the query text. The text doubles as the cache key, so equal
    /// queries always render identically.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let period = period_expr(dialect, self.granularity);
        let projects = self
            .projects
            .iter()
            .map(|p| quote_literal(dialect, p))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT
    {period} AS period_start,
    project,
    SUM(downloads) AS downloads
FROM {table}
WHERE date >= {start}
    AND project IN ({projects})
GROUP BY 1, 2
",
            table = quote_ident(dialect, &self.table),
            start = date_literal(dialect, self.start_date),
        );

        if self.granularity == Granularity::Week {
            let age = age_in_days(dialect, &format!("MAX({period})"), self.as_of);
            sql.push_str(&format!("HAVING {age} >= {COMPLETE_WEEK_DAYS}\n"));
        }

        sql.push_str("ORDER BY 1, 2");
        sql
    }
}

fn period_expr(dialect: Dialect, granularity: Granularity) -> String {
    match (dialect, granularity) {
        (Dialect::BigQuery, Granularity::Week) => "DATE_TRUNC(date, WEEK(SUNDAY))".to_string(),
        (Dialect::BigQuery, Granularity::Month) => "DATE_TRUNC(date, MONTH)".to_string(),
        // strftime('%w') is 0 for Sunday.
        (Dialect::Sqlite, Granularity::Week) => {
            "date(date, '-' || strftime('%w', date) || ' days')".to_string()
        }
        (Dialect::Sqlite, Granularity::Month) => "date(date, 'start of month')".to_string(),
    }
}

fn age_in_days(dialect: Dialect, expr: &str, as_of: NaiveDate) -> String {
    let as_of = date_literal(dialect, as_of);
    match dialect {
        Dialect::BigQuery => format!("DATE_DIFF({as_of}, {expr}, DAY)"),
        Dialect::Sqlite => format!("(julianday({as_of}) - julianday({expr}))"),
    }
}

fn date_literal(dialect: Dialect, date: NaiveDate) -> String {
    match dialect {
        Dialect::BigQuery => format!("DATE '{}'", date.format("%Y-%m-%d")),
        Dialect::Sqlite => format!("'{}'", date.format("%Y-%m-%d")),
    }
}

/// Quote a string literal.
pub fn quote_literal(dialect: Dialect, value: &str) -> String {
    match dialect {
        Dialect::BigQuery => {
            let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
            format!("'{escaped}'")
        }
        Dialect::Sqlite => format!("'{}'", value.replace('\'', "''")),
    }
}

/// Quote a (possibly dotted) table identifier.
pub fn quote_ident(dialect: Dialect, ident: &str) -> String {
    match dialect {
        Dialect::BigQuery => format!("`{}`", ident.replace('`', "\\`")),
        Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(granularity: Granularity) -> AggregationQuery {
        AggregationQuery {
            table: "streamlit.streamlit.pypi_downloads".to_string(),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            granularity,
            projects: vec!["pandas".to_string(), "keras".to_string()],
            as_of: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        }
    }

    #[test]
    fn test_bigquery_monthly_sql() {
        let sql = query(Granularity::Month).to_sql(Dialect::BigQuery);
        assert_eq!(
            sql,
            "SELECT
    DATE_TRUNC(date, MONTH) AS period_start,
    project,
    SUM(downloads) AS downloads
FROM `streamlit.streamlit.pypi_downloads`
WHERE date >= DATE '2020-01-01'
    AND project IN ('pandas', 'keras')
GROUP BY 1, 2
ORDER BY 1, 2"
        );
    }

    #[test]
    fn test_bigquery_weekly_sql_has_completeness_filter() {
        let sql = query(Granularity::Week).to_sql(Dialect::BigQuery);
        assert!(sql.contains("DATE_TRUNC(date, WEEK(SUNDAY)) AS period_start"));
        assert!(sql.contains(
            "HAVING DATE_DIFF(DATE '2026-10-17', MAX(DATE_TRUNC(date, WEEK(SUNDAY))), DAY) >= 7"
        ));
        assert!(sql.ends_with("ORDER BY 1, 2"));
    }

    #[test]
    fn test_sqlite_weekly_sql() {
        let mut q = query(Granularity::Week);
        q.table = "pypi_downloads".to_string();
        let sql = q.to_sql(Dialect::Sqlite);
        assert!(sql.contains("FROM \"pypi_downloads\""));
        assert!(sql.contains("WHERE date >= '2020-01-01'"));
        assert!(sql.contains("HAVING (julianday('2026-10-17') - julianday(MAX("));
    }

    #[test]
    fn test_monthly_sql_has_no_having() {
        let sql = query(Granularity::Month).to_sql(Dialect::Sqlite);
        assert!(!sql.contains("HAVING"));
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal(Dialect::Sqlite, "it's"), "'it''s'");
        assert_eq!(quote_literal(Dialect::BigQuery, "it's"), "'it\\'s'");
        assert_eq!(quote_literal(Dialect::BigQuery, "a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident(Dialect::Sqlite, "we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident(Dialect::BigQuery, "p.d.t"), "`p.d.t`");
    }

    #[test]
    fn test_sql_text_is_stable() {
        let q = query(Granularity::Week);
        assert_eq!(q.to_sql(Dialect::BigQuery), q.clone().to_sql(Dialect::BigQuery));
    }
}
