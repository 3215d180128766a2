// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! BigQuery REST client for running the aggregation query.

use crate::{
    error::WarehouseError,
    query::Dialect,
    warehouse::{RawDate, RawRow, Warehouse},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// How long the server may hold each request open waiting for the job.
const QUERY_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub schema: Option<TableSchema>,
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: bool,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TableRow {
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub struct TableCell {
    pub v: Option<serde_json::Value>,
}

/// A handle to a BigQuery project, reusable across queries.
pub struct BigQueryClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    table: String,
    location: Option<String>,
    token: String,
}

impl BigQueryClient {
    pub fn new(
        project_id: impl Into<String>,
        table: impl Into<String>,
        location: Option<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BIGQUERY_API_BASE.to_string(),
            project_id: project_id.into(),
            table: table.into(),
            location,
            token: token.into(),
        }
    }

    /// Create a client whose OAuth access token is read from an environment
    /// variable (for example the output of `gcloud auth print-access-token`).
    pub fn from_env(
        project_id: impl Into<String>,
        table: impl Into<String>,
        location: Option<String>,
        token_env: &str,
    ) -> Result<Self, WarehouseError> {
        let token = std::env::var(token_env)
            .map_err(|_| WarehouseError::Auth(format!("environment variable {} is not set", token_env)))?;
        Ok(Self::new(project_id, table, location, token))
    }

    /// Send requests to another endpoint, such as a local emulator.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_query(&self, sql: &str) -> Result<QueryResponse, WarehouseError> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: QUERY_TIMEOUT_MS,
            location: self.location.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        decode_response(response).await
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, WarehouseError> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, job.project_id, job.job_id
        );

        let mut params: Vec<(&str, String)> = vec![("timeoutMs", QUERY_TIMEOUT_MS.to_string())];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await?;
        decode_response(response).await
    }
}

async fn decode_response(response: reqwest::Response) -> Result<QueryResponse, WarehouseError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(WarehouseError::Api { status, body });
    }
    Ok(response.json::<QueryResponse>().await?)
}

impl Warehouse for BigQueryClient {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    fn table(&self) -> &str {
        &self.table
    }

    /// Run the query, waiting for the job and following result pages.
    async fn execute(&self, sql: &str) -> Result<Vec<RawRow>, WarehouseError> {
        let mut response = self.post_query(sql).await?;
        let job = response.job_reference.clone();
        let mut schema: Option<TableSchema> = None;
        let mut table_rows = Vec::new();
        let mut pages = 0;

        loop {
            if response.job_complete {
                pages += 1;
                if schema.is_none() {
                    schema = response.schema.take();
                }
                table_rows.append(&mut response.rows);
                if response.page_token.is_none() {
                    break;
                }
            }

            let job = job.as_ref().ok_or_else(|| {
                WarehouseError::MalformedRow("query response has no job reference".to_string())
            })?;
            response = self
                .get_query_results(job, response.page_token.as_deref())
                .await?;
        }

        debug!(pages, rows = table_rows.len(), "BigQuery query complete");

        let schema = schema.ok_or_else(|| {
            WarehouseError::MalformedRow("query response has no schema".to_string())
        })?;
        convert_rows(&schema, table_rows)
    }
}

/// Map BigQuery's cell-list rows onto [`RawRow`]s by schema field name.
pub fn convert_rows(schema: &TableSchema, rows: Vec<TableRow>) -> Result<Vec<RawRow>, WarehouseError> {
    let column = |name: &str| {
        schema
            .fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| WarehouseError::MalformedRow(format!("result has no '{}' column", name)))
    };
    let date_idx = column("period_start")?;
    let project_idx = column("project")?;
    let downloads_idx = column("downloads")?;
    let date_is_timestamp = schema.fields[date_idx].field_type.eq_ignore_ascii_case("TIMESTAMP");

    rows.into_iter()
        .map(|row| {
            let date = cell_str(&row, date_idx)?;
            let project = cell_str(&row, project_idx)?.to_string();
            let downloads = cell_str(&row, downloads_idx)?;

            let period_start = if date_is_timestamp {
                let secs = date.parse::<f64>().map_err(|_| {
                    WarehouseError::MalformedRow(format!("invalid timestamp '{}'", date))
                })?;
                RawDate::EpochSeconds(secs)
            } else {
                RawDate::Text(date.to_string())
            };
            let downloads = downloads.parse::<u64>().map_err(|_| {
                WarehouseError::MalformedRow(format!(
                    "invalid download count '{}' for '{}'",
                    downloads, project
                ))
            })?;

            Ok(RawRow {
                period_start,
                project,
                downloads,
            })
        })
        .collect()
}

fn cell_str(row: &TableRow, idx: usize) -> Result<&str, WarehouseError> {
    match row.f.get(idx).and_then(|cell| cell.v.as_ref()) {
        Some(serde_json::Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(WarehouseError::MalformedRow(format!(
            "unexpected cell value {}",
            other
        ))),
        None => Err(WarehouseError::MalformedRow(format!(
            "missing value in column {}",
            idx
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE_RESPONSE: &str = r#"{
        "kind": "bigquery#queryResponse",
        "schema": {
            "fields": [
                {"name": "period_start", "type": "DATE", "mode": "NULLABLE"},
                {"name": "project", "type": "STRING", "mode": "NULLABLE"},
                {"name": "downloads", "type": "INTEGER", "mode": "NULLABLE"}
            ]
        },
        "jobReference": {"projectId": "demo", "jobId": "job_abc", "location": "US"},
        "totalRows": "2",
        "rows": [
            {"f": [{"v": "2024-01-01"}, {"v": "pandas"}, {"v": "100"}]},
            {"f": [{"v": "2024-02-01"}, {"v": "pandas"}, {"v": "150"}]}
        ],
        "jobComplete": true,
        "cacheHit": false
    }"#;

    #[test]
    fn test_decode_complete_response() {
        let response: QueryResponse = serde_json::from_str(COMPLETE_RESPONSE).unwrap();
        assert!(response.job_complete);
        assert!(response.page_token.is_none());
        assert_eq!(response.job_reference.as_ref().unwrap().job_id, "job_abc");

        let rows = convert_rows(&response.schema.unwrap(), response.rows).unwrap();
        assert_eq!(
            rows,
            vec![
                RawRow {
                    period_start: RawDate::Text("2024-01-01".to_string()),
                    project: "pandas".to_string(),
                    downloads: 100,
                },
                RawRow {
                    period_start: RawDate::Text("2024-02-01".to_string()),
                    project: "pandas".to_string(),
                    downloads: 150,
                },
            ]
        );
    }

    #[test]
    fn test_decode_pending_response() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"jobReference": {"projectId": "demo", "jobId": "job_abc"}, "jobComplete": false}"#,
        )
        .unwrap();
        assert!(!response.job_complete);
        assert!(response.rows.is_empty());
        assert!(response.schema.is_none());
    }

    #[test]
    fn test_convert_timestamp_column() {
        let schema = TableSchema {
            fields: vec![
                FieldSchema { name: "project".to_string(), field_type: "STRING".to_string() },
                FieldSchema { name: "period_start".to_string(), field_type: "TIMESTAMP".to_string() },
                FieldSchema { name: "downloads".to_string(), field_type: "INTEGER".to_string() },
            ],
        };
        let rows: Vec<TableRow> = serde_json::from_str(
            r#"[{"f": [{"v": "numpy"}, {"v": "1.7092512E9"}, {"v": "42"}]}]"#,
        )
        .unwrap();

        let converted = convert_rows(&schema, rows).unwrap();
        assert_eq!(converted[0].project, "numpy");
        assert_eq!(converted[0].period_start, RawDate::EpochSeconds(1.7092512e9));
        assert_eq!(converted[0].downloads, 42);
    }

    #[test]
    fn test_convert_rejects_missing_column() {
        let schema = TableSchema {
            fields: vec![FieldSchema {
                name: "project".to_string(),
                field_type: "STRING".to_string(),
            }],
        };
        let err = convert_rows(&schema, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no 'period_start' column"));
    }

    #[test]
    fn test_convert_rejects_null_cell() {
        let response: QueryResponse = serde_json::from_str(COMPLETE_RESPONSE).unwrap();
        let rows: Vec<TableRow> =
            serde_json::from_str(r#"[{"f": [{"v": "2024-01-01"}, {"v": "pandas"}, {"v": null}]}]"#)
                .unwrap();
        let err = convert_rows(&response.schema.unwrap(), rows).unwrap_err();
        assert!(matches!(err, WarehouseError::MalformedRow(_)));
    }

    #[test]
    fn test_request_body() {
        let request = QueryRequest {
            query: "SELECT 1",
            use_legacy_sql: false,
            timeout_ms: QUERY_TIMEOUT_MS,
            location: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"query": "SELECT 1", "useLegacySql": false, "timeoutMs": 60000})
        );
    }

    mod http {
        use super::*;
        use serde_json::json;
        use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn schema() -> serde_json::Value {
            json!({
                "fields": [
                    {"name": "period_start", "type": "DATE"},
                    {"name": "project", "type": "STRING"},
                    {"name": "downloads", "type": "INTEGER"}
                ]
            })
        }

        fn row(date: &str, project: &str, downloads: &str) -> serde_json::Value {
            json!({"f": [{"v": date}, {"v": project}, {"v": downloads}]})
        }

        fn job() -> serde_json::Value {
            json!({"projectId": "demo", "jobId": "job_abc", "location": "US"})
        }

        fn client(server: &MockServer) -> BigQueryClient {
            BigQueryClient::new("demo", "demo.pypi.downloads", None, "secret")
                .with_base_url(server.uri())
        }

        fn summary(rows: &[RawRow]) -> Vec<(RawDate, &str, u64)> {
            rows.iter()
                .map(|r| (r.period_start.clone(), r.project.as_str(), r.downloads))
                .collect()
        }

        fn text(date: &str) -> RawDate {
            RawDate::Text(date.to_string())
        }

        #[tokio::test]
        async fn test_execute_waits_for_pending_job() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/projects/demo/queries"))
                .and(header("authorization", "Bearer secret"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jobReference": job(),
                    "jobComplete": false
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/projects/demo/queries/job_abc"))
                .and(query_param("location", "US"))
                .and(query_param_is_missing("pageToken"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jobReference": job(),
                    "jobComplete": true,
                    "schema": schema(),
                    "rows": [row("2024-01-01", "pandas", "100")]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let rows = client(&server).execute("SELECT 1").await.unwrap();
            assert_eq!(summary(&rows), vec![(text("2024-01-01"), "pandas", 100)]);
        }

        #[tokio::test]
        async fn test_execute_follows_page_tokens() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/projects/demo/queries"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jobReference": job(),
                    "jobComplete": true,
                    "schema": schema(),
                    "rows": [
                        row("2024-01-01", "keras", "10"),
                        row("2024-01-01", "pandas", "100")
                    ],
                    "pageToken": "page-2"
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/projects/demo/queries/job_abc"))
                .and(query_param("pageToken", "page-2"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jobReference": job(),
                    "jobComplete": true,
                    "rows": [row("2024-02-01", "pandas", "150")]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let rows = client(&server).execute("SELECT 1").await.unwrap();
            assert_eq!(
                summary(&rows),
                vec![
                    (text("2024-01-01"), "keras", 10),
                    (text("2024-01-01"), "pandas", 100),
                    (text("2024-02-01"), "pandas", 150),
                ]
            );
        }

        #[tokio::test]
        async fn test_execute_reports_api_errors() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/projects/demo/queries"))
                .respond_with(
                    ResponseTemplate::new(401)
                        .set_body_string("Request had invalid authentication credentials."),
                )
                .mount(&server)
                .await;

            let err = client(&server).execute("SELECT 1").await.unwrap_err();
            match err {
                WarehouseError::Api { status, body } => {
                    assert_eq!(status, 401);
                    assert!(body.contains("invalid authentication credentials"));
                }
                other => panic!("unexpected error {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_execute_page_token_without_job_reference() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/projects/demo/queries"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "jobComplete": true,
                    "schema": schema(),
                    "rows": [row("2024-01-01", "pandas", "100")],
                    "pageToken": "page-2"
                })))
                .mount(&server)
                .await;

            let err = client(&server).execute("SELECT 1").await.unwrap_err();
            assert!(
                matches!(&err, WarehouseError::MalformedRow(msg) if msg.contains("job reference")),
                "unexpected error {:?}",
                err
            );
        }
    }

    #[test]
    fn test_from_env_without_token() {
        let err = BigQueryClient::from_env("demo", "t", None, "PYPI_METRICS_TEST_UNSET_TOKEN")
            .err()
            .unwrap();
        assert!(matches!(err, WarehouseError::Auth(_)));
    }
}
