//! Centralized constants for the P&L matrix
//!
//! Source-system literals the scenario filters match on, ledger category
//! codes, tax provisioning rates and query limits. Deployment-specific
//! settings are loaded from config.toml.

// =============================================================================
// API Endpoints
// =============================================================================

/// BigQuery REST API base URL
pub const BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Server-side wait per `jobs.query` / `getQueryResults` call
pub const QUERY_WAIT_MS: u64 = 10_000;

/// Give up on a warehouse job after this long
pub const QUERY_TIMEOUT_SECS: u64 = 120;

/// Pause between polls of an unfinished warehouse job
pub const POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// Invoice Attributes (warehouse source values)
// =============================================================================

pub const OPERATION_OUTBOUND: &str = "Saída";
pub const PURPOSE_NORMAL_SALE: &str = "Normal/Venda";
pub const PURPOSE_RETURN: &str = "Devolução";
pub const NOT_CANCELLED: &str = "Não";

pub const SCENARIO_SALE: &str = "Venda";
pub const SCENARIO_INACTIVE: &str = "Inativo";
pub const SCENARIO_BONUS: &str = "Bonificação";
pub const SCENARIO_LOSS: &str = "Baixa de estoque - Perda";

/// Units that are reported as boxes in volume breakdowns
pub const BOX_UNITS: [&str; 2] = ["CAIXA", "CX"];
pub const BOX_UNIT_LABEL: &str = "CX";

// =============================================================================
// Ledger Attributes (relational source values)
// =============================================================================

/// Payable status that excludes a ledger row
pub const STATUS_CANCELLED: &str = "CANCELADO";

/// Returns booked under this expense parent are already counted as returns
pub const MISFILED_RETURN_PARENT: &str = "Operacionais";
pub const MISFILED_RETURN_CATEGORY: &str = "Devolução";

/// Parent categories that hold financial revenue
pub const FINANCIAL_REVENUE_PARENTS: [&str; 2] = ["1.01", "1.02"];

/// Leaf categories left out of financial revenue
pub const FINANCIAL_REVENUE_EXCLUDED: [&str; 2] = ["1.01.99", "1.02.98"];

/// Service revenue leaf category
pub const SERVICE_REVENUE_CATEGORY: &str = "1.02.01";

/// Parent category whose leaves (other than service revenue) are taxable
pub const TAXABLE_FINANCIAL_PARENT: &str = "1.02";

/// Label of the interest/penalty income group appended to financial revenue
pub const INTEREST_INCOME_LABEL: &str = "Interest and penalties";

// =============================================================================
// Income Tax Provisioning (presumed profit regime)
// =============================================================================

pub const CSLL_RATE: f64 = 0.09;
pub const CSLL_PRESUMED_MARGIN: f64 = 0.12;
pub const CSLL_SERVICE_RATE: f64 = 0.0288;

pub const IRPJ_RATE: f64 = 0.15;
pub const IRPJ_PRESUMED_MARGIN: f64 = 0.08;
pub const IRPJ_SURCHARGE_RATE: f64 = 0.10;
/// Monthly presumed profit above which the surcharge applies
pub const IRPJ_SURCHARGE_THRESHOLD: f64 = 20_000.0;
pub const IRPJ_FINANCIAL_RATE: f64 = 0.25;
pub const IRPJ_SERVICE_RATE: f64 = 0.048;

// =============================================================================
// Limits
// =============================================================================

/// Maximum rows returned by a drill-down
pub const DETAIL_ROW_LIMIT: usize = 300;

/// Maximum (label, month) rows fetched for a breakdown
pub const BREAKDOWN_ROW_LIMIT: usize = 500;

/// Years accepted by the year-tree entry points
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

// =============================================================================
// File Names
// =============================================================================

/// Default config file path
pub const CONFIG_FILE: &str = "config.toml";

/// Default corrections file path
pub const CORRECTIONS_FILE: &str = "corrections.csv";
