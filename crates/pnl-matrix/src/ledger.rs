//! Expense ledger access (MySQL)
//!
//! Payables and current-account postings live in the ERP mirror. The pool is
//! created on first use and shared for the life of the process.

use anyhow::{Context, Result};
use pnl_model::Month;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::future::Future;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::LedgerSettings;
use crate::constants;

// =============================================================================
// Public Row Types
// =============================================================================

/// Expense total for one (group, category, month)
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub period: Month,
    /// `"<code> + <parent description>"`, e.g. `"2.07 + Operacionais"`
    pub group: String,
    pub category: String,
    pub amount: f64,
}

/// Financial revenue total for one (parent category, category, month)
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialRevenueRow {
    pub parent_code: String,
    pub parent_label: String,
    pub code: String,
    pub label: String,
    pub period: Month,
    pub amount: f64,
}

/// One payable behind an expense cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDetail {
    pub entry_date: String,
    pub supplier: Option<String>,
    pub note: Option<String>,
    pub status: String,
    pub amount: f64,
}

/// One posting behind a financial revenue cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRevenueDetail {
    pub entry_id: String,
    /// Posting date as stored (`dd/mm/yyyy`)
    pub posted_on: String,
    pub amount: f64,
    pub note: Option<String>,
}

/// Read access to the expense ledger
pub trait Ledger: Send + Sync {
    /// Non-cancelled payables per group and category, misfiled returns excluded
    fn expense_rows(&self, year: i32) -> impl Future<Output = Result<Vec<LedgerRow>>> + Send;

    /// Non-cancelled CSLL and IRPJ payables
    fn tax_expense_rows(&self, year: i32) -> impl Future<Output = Result<Vec<LedgerRow>>> + Send;

    fn financial_revenue_rows(&self, year: i32) -> impl Future<Output = Result<Vec<FinancialRevenueRow>>> + Send;

    /// Payables of one group/category cell, largest first, capped at `limit`
    fn expense_details(
        &self,
        month: Month,
        group: &str,
        category: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExpenseDetail>>> + Send;

    /// Postings of one financial revenue cell, largest first, capped at `limit`
    fn financial_revenue_details(
        &self,
        month: Month,
        parent_label: &str,
        category: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<FinancialRevenueDetail>>> + Send;
}

// =============================================================================
// SQL
// =============================================================================

const ENTRY_DATE: &str = "STR_TO_DATE(cp.data_entrada, '%Y-%m-%d')";
const POSTING_DATE: &str = "STR_TO_DATE(JSON_UNQUOTE(JSON_EXTRACT(l.cabecalho, '$.dDtLanc')), '%d/%m/%Y')";
const POSTING_VALUE: &str = "CAST(JSON_UNQUOTE(JSON_EXTRACT(l.cabecalho, '$.nValorLanc')) AS DOUBLE)";

const PAYABLES_FROM: &str = "FROM omie_contas_pagar_api cp
LEFT JOIN omie_categorias_api cat
  ON cp.codigo_categoria = cat.codigo AND cp.nome_projeto = cat.nome_projeto
LEFT JOIN (
  SELECT DISTINCT nome_projeto, codigo, descricao
  FROM omie_categorias_api
  WHERE conta_despesa = 'S' AND LOCATE('.', codigo) = 2 AND LENGTH(codigo) = 4
) mc
  ON SUBSTRING_INDEX(cp.codigo_categoria, '.', 2) = mc.codigo AND cp.nome_projeto = mc.nome_projeto";

const GROUP_LABEL: &str = "CONCAT(SUBSTRING_INDEX(cp.codigo_categoria, '.', 2), ' + ', mc.descricao)";

const POSTINGS_FROM: &str = "FROM omie_contas_correntes_lancamentos_api l
JOIN omie_categorias_api cat
  ON JSON_UNQUOTE(JSON_EXTRACT(l.detalhes, '$.cCodCateg')) = cat.codigo AND l.nome_projeto = cat.nome_projeto
JOIN omie_categorias_api cat2
  ON cat.categoria_superior = cat2.codigo AND l.nome_projeto = cat2.nome_projeto";

/// Payables grouped by month, group and category for one `?` year
pub fn expense_ledger_sql(tax_only: bool) -> String {
    let category_filter = if tax_only {
        "(cat.descricao LIKE 'IRPJ%' OR cat.descricao LIKE 'CSLL%')".to_string()
    } else {
        format!(
            "NOT (COALESCE(mc.descricao, '') = '{}' AND COALESCE(cat.descricao, '') = '{}')",
            constants::MISFILED_RETURN_PARENT,
            constants::MISFILED_RETURN_CATEGORY
        )
    };
    format!(
        "SELECT {group} AS group_label,
       cat.descricao AS category,
       CAST(SUM(cp.valor_documento) AS DOUBLE) AS amount,
       DATE_FORMAT({date}, '%Y-%m') AS period
{from}
WHERE YEAR({date}) = ?
  AND cp.status_titulo != '{cancelled}'
  AND {category_filter}
GROUP BY period, group_label, category
ORDER BY period, group_label, category",
        group = GROUP_LABEL,
        date = ENTRY_DATE,
        from = PAYABLES_FROM,
        cancelled = constants::STATUS_CANCELLED,
        category_filter = category_filter,
    )
}

pub fn financial_revenue_sql() -> String {
    let quoted = |codes: &[&str]| codes.iter().map(|c| format!("'{}'", c)).collect::<Vec<_>>().join(", ");
    format!(
        "SELECT cat.categoria_superior AS parent_code,
       cat2.descricao AS parent_label,
       cat.codigo AS code,
       cat.descricao AS label,
       DATE_FORMAT({date}, '%Y-%m') AS period,
       CAST(SUM({value}) AS DOUBLE) AS amount
{from}
WHERE cat.categoria_superior IN ({parents})
  AND cat.codigo NOT IN ({excluded})
  AND YEAR({date}) = ?
GROUP BY parent_code, parent_label, code, label, period
ORDER BY period, parent_code, code",
        date = POSTING_DATE,
        value = POSTING_VALUE,
        from = POSTINGS_FROM,
        parents = quoted(&constants::FINANCIAL_REVENUE_PARENTS),
        excluded = quoted(&constants::FINANCIAL_REVENUE_EXCLUDED),
    )
}

/// Binds: month (`YYYY-MM`), group label, category, limit
pub fn expense_details_sql() -> String {
    format!(
        "SELECT DATE_FORMAT({date}, '%Y-%m-%d') AS entry_date,
       cl.nome_fantasia AS supplier,
       cp2.observacao AS note,
       cp.status_titulo AS status,
       CAST(cp.valor_documento AS DOUBLE) AS amount
{from}
LEFT JOIN omie_consulta_contas_pagar_api cp2 ON cp2.codigo_lancamento_omie = cp.codigo_lancamento_omie
LEFT JOIN omie_clientes_api cl ON cp.codigo_cliente_fornecedor = cl.codigo_cliente_omie
WHERE DATE_FORMAT({date}, '%Y-%m') = ?
  AND {group} = ?
  AND cat.descricao = ?
  AND cp.status_titulo != '{cancelled}'
ORDER BY amount DESC
LIMIT ?",
        date = ENTRY_DATE,
        from = PAYABLES_FROM,
        group = GROUP_LABEL,
        cancelled = constants::STATUS_CANCELLED,
    )
}

/// Binds: parent label, category, month (`YYYY-MM`), limit
pub fn financial_revenue_details_sql() -> String {
    format!(
        "SELECT CAST(l.dev_id AS CHAR) AS entry_id,
       JSON_UNQUOTE(JSON_EXTRACT(l.cabecalho, '$.dDtLanc')) AS posted_on,
       {value} AS amount,
       JSON_UNQUOTE(JSON_EXTRACT(l.detalhes, '$.cObs')) AS note
{from}
WHERE cat2.descricao = ?
  AND cat.descricao = ?
  AND DATE_FORMAT({date}, '%Y-%m') = ?
ORDER BY amount DESC
LIMIT ?",
        value = POSTING_VALUE,
        from = POSTINGS_FROM,
        date = POSTING_DATE,
    )
}

// =============================================================================
// Query Rows
// =============================================================================

#[derive(FromRow)]
struct ExpenseTotalRow {
    group_label: Option<String>,
    category: Option<String>,
    amount: Option<f64>,
    period: Option<String>,
}

#[derive(FromRow)]
struct FinancialRevenueTotalRow {
    parent_code: Option<String>,
    parent_label: Option<String>,
    code: Option<String>,
    label: Option<String>,
    period: Option<String>,
    amount: Option<f64>,
}

#[derive(FromRow)]
struct ExpenseDetailRow {
    entry_date: Option<String>,
    supplier: Option<String>,
    note: Option<String>,
    status: Option<String>,
    amount: Option<f64>,
}

#[derive(FromRow)]
struct FinancialRevenueDetailRow {
    entry_id: Option<String>,
    posted_on: Option<String>,
    amount: Option<f64>,
    note: Option<String>,
}

// =============================================================================
// MySQL Ledger
// =============================================================================

pub struct MySqlLedger {
    url: String,
    max_connections: u32,
    pool: OnceCell<MySqlPool>,
}

impl MySqlLedger {
    pub fn new(settings: &LedgerSettings) -> Self {
        Self {
            url: settings.database_url.clone(),
            max_connections: settings.max_connections,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&MySqlPool> {
        self.pool
            .get_or_try_init(|| async {
                info!(max_connections = self.max_connections, "opening ledger connection pool");
                MySqlPoolOptions::new()
                    .max_connections(self.max_connections)
                    .connect(&self.url)
                    .await
                    .context("Failed to connect to ledger database")
            })
            .await
    }

    async fn ledger_rows(&self, year: i32, tax_only: bool) -> Result<Vec<LedgerRow>> {
        let rows: Vec<ExpenseTotalRow> = sqlx::query_as(&expense_ledger_sql(tax_only))
            .bind(year)
            .fetch_all(self.pool().await?)
            .await
            .context("Failed to query expense ledger")?;

        debug!(year, tax_only, rows = rows.len(), "expense ledger loaded");
        Ok(rows.into_iter().filter_map(ExpenseTotalRow::into_ledger_row).collect())
    }
}

impl Ledger for MySqlLedger {
    async fn expense_rows(&self, year: i32) -> Result<Vec<LedgerRow>> {
        self.ledger_rows(year, false).await
    }

    async fn tax_expense_rows(&self, year: i32) -> Result<Vec<LedgerRow>> {
        self.ledger_rows(year, true).await
    }

    async fn financial_revenue_rows(&self, year: i32) -> Result<Vec<FinancialRevenueRow>> {
        let rows: Vec<FinancialRevenueTotalRow> = sqlx::query_as(&financial_revenue_sql())
            .bind(year)
            .fetch_all(self.pool().await?)
            .await
            .context("Failed to query financial revenue")?;

        Ok(rows
            .into_iter()
            .filter_map(FinancialRevenueTotalRow::into_revenue_row)
            .collect())
    }

    async fn expense_details(&self, month: Month, group: &str, category: &str, limit: usize) -> Result<Vec<ExpenseDetail>> {
        let rows: Vec<ExpenseDetailRow> = sqlx::query_as(&expense_details_sql())
            .bind(month.to_string())
            .bind(group)
            .bind(category)
            .bind(limit as i64)
            .fetch_all(self.pool().await?)
            .await
            .context("Failed to query expense details")?;

        Ok(rows
            .into_iter()
            .map(|r| ExpenseDetail {
                entry_date: r.entry_date.unwrap_or_default(),
                supplier: r.supplier,
                note: r.note,
                status: r.status.unwrap_or_default(),
                amount: finite(r.amount),
            })
            .collect())
    }

    async fn financial_revenue_details(
        &self,
        month: Month,
        parent_label: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<FinancialRevenueDetail>> {
        let rows: Vec<FinancialRevenueDetailRow> = sqlx::query_as(&financial_revenue_details_sql())
            .bind(parent_label)
            .bind(category)
            .bind(month.to_string())
            .bind(limit as i64)
            .fetch_all(self.pool().await?)
            .await
            .context("Failed to query financial revenue details")?;

        Ok(rows
            .into_iter()
            .map(|r| FinancialRevenueDetail {
                entry_id: r.entry_id.unwrap_or_default(),
                posted_on: r.posted_on.unwrap_or_default(),
                amount: finite(r.amount),
                note: r.note,
            })
            .collect())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

impl ExpenseTotalRow {
    fn into_ledger_row(self) -> Option<LedgerRow> {
        let period = parse_period(self.period.as_deref())?;
        Some(LedgerRow {
            period,
            group: self.group_label.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            amount: finite(self.amount),
        })
    }
}

impl FinancialRevenueTotalRow {
    fn into_revenue_row(self) -> Option<FinancialRevenueRow> {
        let period = parse_period(self.period.as_deref())?;
        Some(FinancialRevenueRow {
            parent_code: self.parent_code.unwrap_or_default(),
            parent_label: self.parent_label.unwrap_or_default(),
            code: self.code.unwrap_or_default(),
            label: self.label.unwrap_or_default(),
            period,
            amount: finite(self.amount),
        })
    }
}

fn parse_period(raw: Option<&str>) -> Option<Month> {
    let raw = raw.unwrap_or_default();
    match raw.parse::<Month>() {
        Ok(month) => Some(month),
        Err(err) => {
            warn!(%err, "dropping ledger row with unusable period");
            None
        }
    }
}

fn finite(amount: Option<f64>) -> f64 {
    amount.filter(|v| v.is_finite()).unwrap_or(0.0)
}
