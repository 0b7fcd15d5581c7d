//! BigQuery REST client for the invoice warehouse
//!
//! Queries run through `jobs.query` with named parameters. Jobs that do not
//! finish within the server-side wait are polled with `getQueryResults`, and
//! multi-page results are followed with `pageToken`.
//!
//! API docs: https://cloud.google.com/bigquery/docs/reference/rest/v2/jobs/query

use anyhow::{Context, Result};
use pnl_model::Month;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::WarehouseSettings;
use crate::constants;
use crate::numeric::{self, Row};
use crate::warehouse::{AggregateQuery, ISSUE_DATE_SQL, ItemDetail, ItemQuery, SeriesRow, Warehouse};

// =============================================================================
// API Types
// =============================================================================

/// Request body for `jobs.query`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<QueryParameter>,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: &'static str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

#[derive(Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ParameterValue {
    value: String,
}

impl QueryParameter {
    fn int64(name: &'static str, value: i64) -> Self {
        Self {
            name,
            parameter_type: ParameterType { kind: "INT64" },
            parameter_value: ParameterValue {
                value: value.to_string(),
            },
        }
    }

    fn string(name: &'static str, value: String) -> Self {
        Self {
            name,
            parameter_type: ParameterType { kind: "STRING" },
            parameter_value: ParameterValue { value },
        }
    }
}

/// Response shared by `jobs.query` and `jobs.getQueryResults`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

// =============================================================================
// BigQuery Client
// =============================================================================

/// Warehouse client over the BigQuery REST API
pub struct BigQueryClient {
    client: reqwest::Client,
    project_id: String,
    /// Fully-qualified table id, validated when the config is loaded
    table: String,
    location: Option<String>,
    access_token: String,
}

impl BigQueryClient {
    pub fn new(settings: &WarehouseSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            project_id: settings.project_id.clone(),
            table: settings.table.clone(),
            location: settings.location.clone(),
            access_token: settings.access_token.clone(),
        }
    }

    /// Execute a SQL query and wait for all result pages
    async fn execute_query(&self, sql: &str, params: Vec<QueryParameter>) -> Result<Vec<Row>> {
        let url = format!("{}/projects/{}/queries", constants::BIGQUERY_API_BASE, self.project_id);
        let request = QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: params,
            timeout_ms: constants::QUERY_WAIT_MS,
            location: self.location.clone(),
        };

        let mut response: QueryResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .context("Failed to submit warehouse query")?
            .error_for_status()
            .context("Warehouse rejected the query")?
            .json()
            .await
            .context("Failed to parse warehouse query response")?;

        let timeout = Duration::from_secs(constants::QUERY_TIMEOUT_SECS);
        let start = Instant::now();

        while !response.job_complete {
            if start.elapsed() > timeout {
                anyhow::bail!("Warehouse query timed out after {} seconds", constants::QUERY_TIMEOUT_SECS);
            }
            let job = response
                .job_reference
                .clone()
                .context("Unfinished warehouse job has no job reference")?;
            debug!(job_id = %job.job_id, "warehouse job still running");
            sleep(Duration::from_millis(constants::POLL_INTERVAL_MS)).await;
            response = self.get_results(&job, None).await?;
        }

        check_errors(&response.errors)?;

        let fields: Vec<String> = response
            .schema
            .take()
            .map(|schema| schema.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default();
        let job = response.job_reference.take();
        let mut rows = to_rows(&fields, std::mem::take(&mut response.rows));
        let mut page_token = response.page_token.take();

        while let Some(token) = page_token {
            let job = job.as_ref().context("Paged warehouse result has no job reference")?;
            let page = self.get_results(job, Some(&token)).await?;
            check_errors(&page.errors)?;
            rows.extend(to_rows(&fields, page.rows));
            page_token = page.page_token;
        }

        debug!(rows = rows.len(), "warehouse query finished");
        Ok(rows)
    }

    async fn get_results(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let base = format!(
            "{}/projects/{}/queries/{}",
            constants::BIGQUERY_API_BASE,
            self.project_id,
            job.job_id
        );
        let mut params = vec![("timeoutMs", constants::QUERY_WAIT_MS.to_string())];
        if let Some(location) = job.location.as_ref().or(self.location.as_ref()) {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let url = reqwest::Url::parse_with_params(&base, &params).context("Invalid warehouse results URL")?;

        self.client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to get warehouse results")?
            .error_for_status()
            .context("Warehouse rejected the results request")?
            .json()
            .await
            .context("Failed to parse warehouse results response")
    }
}

impl Warehouse for BigQueryClient {
    async fn aggregate(&self, year: i32, query: &AggregateQuery) -> Result<Vec<SeriesRow>> {
        if query.branches.is_empty() {
            return Ok(Vec::new());
        }
        let sql = aggregate_sql(&self.table, query);
        let rows = self
            .execute_query(&sql, vec![QueryParameter::int64("year", i64::from(year))])
            .await?;
        Ok(rows.iter().filter_map(series_row).collect())
    }

    async fn items(&self, month: Month, query: &ItemQuery) -> Result<Vec<ItemDetail>> {
        let sql = items_sql(&self.table, query);
        let rows = self
            .execute_query(&sql, vec![QueryParameter::string("ym", month.to_string())])
            .await?;
        Ok(rows
            .iter()
            .map(|row| ItemDetail {
                label: numeric::get_string(row, "label"),
                line_count: numeric::get_count(row, "line_count"),
                total: numeric::get_f64(row, "total"),
            })
            .collect())
    }
}

// =============================================================================
// SQL Rendering
// =============================================================================

/// Union of all branches, summed per (series, label, month) for `@year`.
/// Within a month the largest amounts come first, so a row cap keeps them.
pub fn aggregate_sql(table: &str, query: &AggregateQuery) -> String {
    let label = query.grouping.sql_expr();
    let branches: Vec<String> = query
        .branches
        .iter()
        .map(|branch| {
            format!(
                "SELECT {series} AS series, {label} AS label, FORMAT_DATE('%Y-%m', {date}) AS period, {amount} AS amount\n  \
                 FROM `{table}`\n  \
                 WHERE EXTRACT(YEAR FROM {date}) = @year AND {filter}",
                series = crate::warehouse::quote_literal(&branch.series),
                label = label,
                date = ISSUE_DATE_SQL,
                amount = branch.sql_amount(),
                table = table,
                filter = branch.sql_filter(),
            )
        })
        .collect();

    let mut sql = format!(
        "SELECT series, label, period, SUM(amount) AS amount\nFROM (\n  {}\n)\nGROUP BY series, label, period\nORDER BY period, amount DESC, series, label",
        branches.join("\n  UNION ALL\n  ")
    );
    if let Some(limit) = query.limit {
        sql.push_str(&format!("\nLIMIT {}", limit));
    }
    sql
}

/// Items of one branch within `@ym`, summed per label, largest first
pub fn items_sql(table: &str, query: &ItemQuery) -> String {
    let mut filter = query.branch.sql_filter();
    if query.nonzero_only {
        filter.push_str(&format!(" AND ({}) != 0", query.branch.selector.sql_expr()));
    }
    format!(
        "SELECT label, COUNT(*) AS line_count, SUM(amount) AS total\nFROM (\n  \
         SELECT {label} AS label, {amount} AS amount\n  \
         FROM `{table}`\n  \
         WHERE FORMAT_DATE('%Y-%m', {date}) = @ym AND {filter}\n)\n\
         GROUP BY label\nORDER BY total DESC\nLIMIT {limit}",
        label = query.grouping.sql_expr(),
        amount = query.branch.sql_amount(),
        table = table,
        date = ISSUE_DATE_SQL,
        filter = filter,
        limit = query.limit,
    )
}

// =============================================================================
// Helper Functions
// =============================================================================

fn check_errors(errors: &[ErrorProto]) -> Result<()> {
    if let Some(error) = errors.first() {
        anyhow::bail!(
            "Warehouse query failed: {} ({})",
            error.message.as_deref().unwrap_or("unknown error"),
            error.reason.as_deref().unwrap_or("no reason")
        );
    }
    Ok(())
}

/// Zip positional cells with schema field names
fn to_rows(fields: &[String], rows: Vec<TableRow>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| fields.iter().cloned().zip(row.f.into_iter().map(|cell| cell.v)).collect())
        .collect()
}

fn series_row(row: &Row) -> Option<SeriesRow> {
    let raw_period = numeric::get_string(row, "period");
    match raw_period.parse::<Month>() {
        Ok(period) => Some(SeriesRow {
            series: numeric::get_string(row, "series"),
            label: numeric::get_string(row, "label"),
            period,
            amount: numeric::get_f64(row, "amount"),
        }),
        Err(err) => {
            warn!(%err, "dropping warehouse row with unusable period");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{Branch, Column, Grouping, Scenario, Selector};

    #[test]
    fn test_aggregate_sql_unions_branches() {
        let query = AggregateQuery::new(vec![
            Branch::new("gross_revenue", Scenario::Sale, Selector::Sum(&[Column::ProductValue])),
            Branch::new("returns", Scenario::Return, Selector::Sum(&[Column::ProductValue])),
        ])
        .grouped(Grouping::Family, 500);

        let sql = aggregate_sql("proj.sales.nfe", &query);
        assert_eq!(sql.matches("UNION ALL").count(), 1);
        assert_eq!(sql.matches("FROM `proj.sales.nfe`").count(), 2);
        assert!(sql.contains("'gross_revenue' AS series"));
        assert!(sql.contains("descricao_familia AS label"));
        assert!(sql.contains("EXTRACT(YEAR FROM DATE(data_emissao)) = @year"));
        assert!(sql.contains("ORDER BY period, amount DESC, series, label"));
        assert!(sql.ends_with("LIMIT 500"));
    }

    #[test]
    fn test_items_sql_filters_zero_values() {
        let query = ItemQuery {
            branch: Branch::new("PIS", Scenario::Return, Selector::Sum(&[Column::Pis])).scaled(-1.0),
            grouping: Grouping::NormalizedProduct,
            nonzero_only: true,
            limit: 300,
        };
        let sql = items_sql("proj.sales.nfe", &query);
        assert!(sql.contains("COALESCE(produto_norm, parsed_x_prod_value) AS label"));
        assert!(sql.contains("!= 0"));
        assert!(sql.contains("= @ym"));
        assert!(sql.contains("ORDER BY total DESC"));
        assert!(sql.ends_with("LIMIT 300"));
    }

    #[test]
    fn test_response_rows_are_keyed_by_schema() {
        let json = serde_json::json!({
            "jobComplete": true,
            "schema": { "fields": [{ "name": "series" }, { "name": "label" }, { "name": "period" }, { "name": "amount" }] },
            "rows": [
                { "f": [{ "v": "returns" }, { "v": null }, { "v": "2025-01" }, { "v": "50.5" }] },
                { "f": [{ "v": "returns" }, { "v": "" }, { "v": "bad" }, { "v": "1" }] }
            ]
        });
        let response: QueryResponse = serde_json::from_value(json).unwrap();
        let fields: Vec<String> = response.schema.unwrap().fields.into_iter().map(|f| f.name).collect();
        let rows = to_rows(&fields, response.rows);
        let parsed: Vec<SeriesRow> = rows.iter().filter_map(series_row).collect();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].series, "returns");
        assert_eq!(parsed[0].label, "");
        assert_eq!(parsed[0].period.to_string(), "2025-01");
        assert_eq!(parsed[0].amount, 50.5);
    }

    #[test]
    fn test_error_proto_fails_the_query() {
        let errors = vec![ErrorProto {
            reason: Some("invalidQuery".into()),
            message: Some("Unrecognized name".into()),
        }];
        let err = check_errors(&errors).unwrap_err();
        assert!(err.to_string().contains("Unrecognized name"));
        assert!(check_errors(&[]).is_ok());
    }
}
