//! Invoice warehouse query model
//!
//! Concept fetchers describe what they need as an [`AggregateQuery`]: one or
//! more branches (scenario filter, value selector, sign) unioned together and
//! grouped by month plus an optional label dimension. Every backing store
//! evaluates the same description. The BigQuery client renders it to SQL with
//! the `sql_*` helpers below; the in-memory store evaluates it over fixture
//! lines with the matching Rust predicates.

use chrono::NaiveDate;
use pnl_model::Month;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::constants;
use crate::numeric::lenient_f64;

/// Issue-date column of the invoice table
pub const ISSUE_DATE_SQL: &str = "DATE(data_emissao)";

// =============================================================================
// Invoice Lines
// =============================================================================

/// One invoice item as stored in the warehouse table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceLine {
    /// data_emissao
    pub issued_on: NaiveDate,
    /// tipo_operacao
    pub operation: String,
    /// finalidade
    pub purpose: String,
    /// cancelada
    pub cancelled: String,
    /// nome_cenario
    pub scenario: String,
    /// parsed_x_prod_value
    #[serde(default)]
    pub product: Option<String>,
    /// produto_norm
    #[serde(default)]
    pub product_normalized: Option<String>,
    /// descricao_familia
    #[serde(default)]
    pub family: Option<String>,
    /// parsed_type_unit
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub product_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub freight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub discount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub interest_penalty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unit_cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pis: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cofins: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub iss: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ir: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fcp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub icms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub icms_destination: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub icms_sender: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ipi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub icms_st: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fcp_st: Option<f64>,
}

// =============================================================================
// Scenario Filters
// =============================================================================

/// Which invoice items a branch includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Outbound normal sales, scenario sale or inactive
    Sale,
    /// Outbound normal sales booked as bonus/samples
    Bonus,
    /// Outbound normal sales booked as inventory write-off
    Loss,
    /// Returns
    Return,
}

impl Scenario {
    pub fn sql_predicate(self) -> String {
        let outbound_sale = format!(
            "tipo_operacao = {} AND finalidade = {} AND cancelada = {}",
            quote_literal(constants::OPERATION_OUTBOUND),
            quote_literal(constants::PURPOSE_NORMAL_SALE),
            quote_literal(constants::NOT_CANCELLED),
        );
        match self {
            Scenario::Sale => format!(
                "{} AND nome_cenario IN ({}, {})",
                outbound_sale,
                quote_literal(constants::SCENARIO_SALE),
                quote_literal(constants::SCENARIO_INACTIVE),
            ),
            Scenario::Bonus => format!(
                "{} AND nome_cenario = {}",
                outbound_sale,
                quote_literal(constants::SCENARIO_BONUS)
            ),
            Scenario::Loss => format!(
                "{} AND nome_cenario = {}",
                outbound_sale,
                quote_literal(constants::SCENARIO_LOSS)
            ),
            Scenario::Return => format!(
                "finalidade = {} AND cancelada = {}",
                quote_literal(constants::PURPOSE_RETURN),
                quote_literal(constants::NOT_CANCELLED),
            ),
        }
    }

    pub fn matches(self, line: &InvoiceLine) -> bool {
        let outbound_sale = line.operation == constants::OPERATION_OUTBOUND
            && line.purpose == constants::PURPOSE_NORMAL_SALE
            && line.cancelled == constants::NOT_CANCELLED;
        match self {
            Scenario::Sale => {
                outbound_sale
                    && (line.scenario == constants::SCENARIO_SALE || line.scenario == constants::SCENARIO_INACTIVE)
            }
            Scenario::Bonus => outbound_sale && line.scenario == constants::SCENARIO_BONUS,
            Scenario::Loss => outbound_sale && line.scenario == constants::SCENARIO_LOSS,
            Scenario::Return => line.purpose == constants::PURPOSE_RETURN && line.cancelled == constants::NOT_CANCELLED,
        }
    }
}

// =============================================================================
// Value Selectors
// =============================================================================

/// Numeric invoice columns a selector can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    ProductValue,
    Freight,
    Discount,
    InterestPenalty,
    UnitCost,
    Quantity,
    Pis,
    Cofins,
    Iss,
    Ir,
    Fcp,
    Icms,
    IcmsDestination,
    IcmsSender,
    Ipi,
    IcmsSt,
    FcpSt,
}

impl Column {
    pub fn sql_name(self) -> &'static str {
        match self {
            Column::ProductValue => "parsed_total_product_value",
            Column::Freight => "parsed_frete_value",
            Column::Discount => "parsed_desconto_proportional_value",
            Column::InterestPenalty => "parsed_multa_juros_proportional_value",
            Column::UnitCost => "parsed_unit_cost",
            Column::Quantity => "parsed_quantity_units",
            Column::Pis => "parsed_pis_value",
            Column::Cofins => "parsed_cofins_value",
            Column::Iss => "parsed_iss_value",
            Column::Ir => "parsed_ir_value",
            Column::Fcp => "parsed_fcp_value",
            Column::Icms => "parsed_icms_value",
            Column::IcmsDestination => "parsed_icm_dest_value",
            Column::IcmsSender => "parsed_icm_remet_value",
            Column::Ipi => "parsed_ipi_value",
            Column::IcmsSt => "parsed_icmsst_value",
            Column::FcpSt => "parsed_fcpst_value",
        }
    }

    /// Column as FLOAT64, accepting comma-decimal text; NULL when unparseable
    pub fn sql_numeric(self) -> String {
        let name = self.sql_name();
        format!(
            "COALESCE(SAFE_CAST({name} AS FLOAT64), \
             SAFE_CAST(REPLACE(REPLACE(CAST({name} AS STRING), '.', ''), ',', '.') AS FLOAT64))"
        )
    }

    pub fn read(self, line: &InvoiceLine) -> Option<f64> {
        match self {
            Column::ProductValue => line.product_value,
            Column::Freight => line.freight,
            Column::Discount => line.discount,
            Column::InterestPenalty => line.interest_penalty,
            Column::UnitCost => line.unit_cost,
            Column::Quantity => line.quantity,
            Column::Pis => line.pis,
            Column::Cofins => line.cofins,
            Column::Iss => line.iss,
            Column::Ir => line.ir,
            Column::Fcp => line.fcp,
            Column::Icms => line.icms,
            Column::IcmsDestination => line.icms_destination,
            Column::IcmsSender => line.icms_sender,
            Column::Ipi => line.ipi,
            Column::IcmsSt => line.icms_st,
            Column::FcpSt => line.fcp_st,
        }
    }
}

/// Arithmetic over invoice columns; missing values count as zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Sum(&'static [Column]),
    Product(Column, Column),
}

impl Selector {
    pub fn sql_expr(self) -> String {
        let operand = |column: Column| format!("COALESCE({}, 0)", column.sql_numeric());
        match self {
            Selector::Sum(columns) if columns.is_empty() => "0".to_string(),
            Selector::Sum(columns) => columns.iter().map(|c| operand(*c)).collect::<Vec<_>>().join(" + "),
            Selector::Product(a, b) => format!("{} * {}", operand(a), operand(b)),
        }
    }

    pub fn evaluate(self, line: &InvoiceLine) -> f64 {
        let read = |column: Column| column.read(line).unwrap_or(0.0);
        match self {
            Selector::Sum(columns) => columns.iter().map(|c| read(*c)).sum(),
            Selector::Product(a, b) => read(a) * read(b),
        }
    }
}

// =============================================================================
// Grouping
// =============================================================================

/// Label dimension rows are grouped by, besides the month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    None,
    Family,
    Product,
    /// Curated product name when present, raw product otherwise
    NormalizedProduct,
    /// `"<family> (<unit>)"`
    VolumeFamily,
    /// `"<product> (<unit>)"`
    VolumeProduct,
}

impl Grouping {
    pub fn sql_expr(self) -> String {
        let unit = format!(
            "CASE WHEN UPPER(COALESCE(parsed_type_unit, '')) IN ({}) THEN {} ELSE COALESCE(parsed_type_unit, '') END",
            constants::BOX_UNITS
                .iter()
                .map(|unit| quote_literal(unit))
                .collect::<Vec<_>>()
                .join(", "),
            quote_literal(constants::BOX_UNIT_LABEL),
        );
        let with_unit = |name: &str| {
            format!(
                "IF({name} IS NULL, NULL, IF({unit} = '', {name}, FORMAT('%s (%s)', {name}, {unit})))",
                name = name,
                unit = unit
            )
        };
        match self {
            Grouping::None => "''".to_string(),
            Grouping::Family => "descricao_familia".to_string(),
            Grouping::Product => "parsed_x_prod_value".to_string(),
            Grouping::NormalizedProduct => "COALESCE(produto_norm, parsed_x_prod_value)".to_string(),
            Grouping::VolumeFamily => with_unit("descricao_familia"),
            Grouping::VolumeProduct => with_unit("parsed_x_prod_value"),
        }
    }

    /// Label of `line` under this grouping; empty when the source is null
    pub fn label(self, line: &InvoiceLine) -> String {
        let with_unit = |name: &Option<String>| match name {
            None => String::new(),
            Some(name) => {
                let raw_unit = line.unit.as_deref().unwrap_or("").trim();
                let unit = if constants::BOX_UNITS.iter().any(|u| u.eq_ignore_ascii_case(raw_unit)) {
                    constants::BOX_UNIT_LABEL
                } else {
                    raw_unit
                };
                if unit.is_empty() {
                    name.clone()
                } else {
                    format!("{} ({})", name, unit)
                }
            }
        };
        match self {
            Grouping::None => String::new(),
            Grouping::Family => line.family.clone().unwrap_or_default(),
            Grouping::Product => line.product.clone().unwrap_or_default(),
            Grouping::NormalizedProduct => line
                .product_normalized
                .clone()
                .or_else(|| line.product.clone())
                .unwrap_or_default(),
            Grouping::VolumeFamily => with_unit(&line.family),
            Grouping::VolumeProduct => with_unit(&line.product),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// One scenario-filtered, signed stream of amounts
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Tag identifying the branch in result rows
    pub series: String,
    pub scenario: Scenario,
    pub selector: Selector,
    pub factor: f64,
    /// Keep only items whose selected value is strictly positive
    pub positive_only: bool,
}

impl Branch {
    pub fn new(series: impl Into<String>, scenario: Scenario, selector: Selector) -> Self {
        Self {
            series: series.into(),
            scenario,
            selector,
            factor: 1.0,
            positive_only: false,
        }
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn positive_only(mut self) -> Self {
        self.positive_only = true;
        self
    }

    /// Signed contribution of `line`, or `None` when the branch excludes it
    pub fn value(&self, line: &InvoiceLine) -> Option<f64> {
        if !self.scenario.matches(line) {
            return None;
        }
        let value = self.selector.evaluate(line);
        if self.positive_only && value <= 0.0 {
            return None;
        }
        Some(value * self.factor)
    }

    /// WHERE-clause fragment for this branch's filters
    pub fn sql_filter(&self) -> String {
        let mut filter = format!("({})", self.scenario.sql_predicate());
        if self.positive_only {
            filter.push_str(&format!(" AND ({}) > 0", self.selector.sql_expr()));
        }
        filter
    }

    pub fn sql_amount(&self) -> String {
        format!("({}) * {}", self.selector.sql_expr(), sql_float(self.factor))
    }
}

/// Union of branches summed per (series, label, month) over one year
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub branches: Vec<Branch>,
    pub grouping: Grouping,
    /// Cap on returned rows (ordered by month)
    pub limit: Option<usize>,
}

impl AggregateQuery {
    pub fn new(branches: Vec<Branch>) -> Self {
        Self {
            branches,
            grouping: Grouping::None,
            limit: None,
        }
    }

    pub fn grouped(mut self, grouping: Grouping, limit: usize) -> Self {
        self.grouping = grouping;
        self.limit = Some(limit);
        self
    }
}

/// Aggregate result row
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub series: String,
    pub label: String,
    pub period: Month,
    pub amount: f64,
}

/// Items of one branch within a single month, summed per label
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    pub branch: Branch,
    pub grouping: Grouping,
    /// Skip items whose selected value is zero
    pub nonzero_only: bool,
    pub limit: usize,
}

/// Per-product drill-down row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub label: String,
    pub line_count: u64,
    pub total: f64,
}

/// Read access to the invoice warehouse
pub trait Warehouse: Send + Sync {
    fn aggregate(&self, year: i32, query: &AggregateQuery) -> impl Future<Output = anyhow::Result<Vec<SeriesRow>>> + Send;

    /// Rows ordered by total, descending
    fn items(&self, month: Month, query: &ItemQuery) -> impl Future<Output = anyhow::Result<Vec<ItemDetail>>> + Send;
}

// =============================================================================
// SQL helpers
// =============================================================================

/// Quote a string literal for BigQuery standard SQL
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn sql_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale_line() -> InvoiceLine {
        InvoiceLine {
            issued_on: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            operation: constants::OPERATION_OUTBOUND.to_string(),
            purpose: constants::PURPOSE_NORMAL_SALE.to_string(),
            cancelled: constants::NOT_CANCELLED.to_string(),
            scenario: constants::SCENARIO_SALE.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_matching() {
        let sale = sale_line();
        assert!(Scenario::Sale.matches(&sale));
        assert!(!Scenario::Bonus.matches(&sale));

        let inactive = InvoiceLine {
            scenario: constants::SCENARIO_INACTIVE.to_string(),
            ..sale_line()
        };
        assert!(Scenario::Sale.matches(&inactive));

        let cancelled = InvoiceLine {
            cancelled: "Sim".to_string(),
            ..sale_line()
        };
        assert!(!Scenario::Sale.matches(&cancelled));

        let inbound_bonus = InvoiceLine {
            operation: "Entrada".to_string(),
            scenario: constants::SCENARIO_BONUS.to_string(),
            ..sale_line()
        };
        assert!(!Scenario::Bonus.matches(&inbound_bonus));

        let ret = InvoiceLine {
            operation: "Entrada".to_string(),
            purpose: constants::PURPOSE_RETURN.to_string(),
            ..sale_line()
        };
        assert!(Scenario::Return.matches(&ret));
        assert!(!Scenario::Sale.matches(&ret));
    }

    #[test]
    fn test_selectors_treat_missing_as_zero() {
        let line = InvoiceLine {
            product_value: Some(100.0),
            freight: None,
            unit_cost: Some(2.5),
            quantity: Some(4.0),
            ..sale_line()
        };
        assert_eq!(Selector::Sum(&[Column::ProductValue, Column::Freight]).evaluate(&line), 100.0);
        assert_eq!(Selector::Product(Column::UnitCost, Column::Quantity).evaluate(&line), 10.0);
        assert_eq!(Selector::Product(Column::UnitCost, Column::Discount).evaluate(&line), 0.0);
    }

    #[test]
    fn test_branch_sign_and_positive_filter() {
        let line = InvoiceLine {
            discount: Some(-5.0),
            ipi: Some(3.0),
            ..sale_line()
        };
        let discount = Branch::new("discount", Scenario::Sale, Selector::Sum(&[Column::Discount])).positive_only();
        assert_eq!(discount.value(&line), None);

        let flipped = Branch::new("ipi", Scenario::Sale, Selector::Sum(&[Column::Ipi])).scaled(-1.0);
        assert_eq!(flipped.value(&line), Some(-3.0));
    }

    #[test]
    fn test_volume_labels_map_box_units() {
        let line = InvoiceLine {
            family: Some("Snacks".to_string()),
            product: Some("Bar".to_string()),
            unit: Some("caixa".to_string()),
            ..sale_line()
        };
        assert_eq!(Grouping::VolumeFamily.label(&line), "Snacks (CX)");

        let kilos = InvoiceLine {
            unit: Some("KG".to_string()),
            ..line.clone()
        };
        assert_eq!(Grouping::VolumeProduct.label(&kilos), "Bar (KG)");

        let no_family = InvoiceLine { family: None, ..line };
        assert_eq!(Grouping::VolumeFamily.label(&no_family), "");
    }

    #[test]
    fn test_sql_fragments() {
        assert_eq!(quote_literal("it's"), "'it\\'s'");
        assert!(Scenario::Return.sql_predicate().contains("finalidade = 'Devolução'"));
        let expr = Selector::Product(Column::UnitCost, Column::Quantity).sql_expr();
        assert!(expr.contains("parsed_unit_cost"));
        assert!(expr.contains(" * "));

        let branch = Branch::new("returns", Scenario::Return, Selector::Sum(&[Column::Ipi])).scaled(-1.0);
        assert!(branch.sql_amount().ends_with("* -1.0"));
    }
}
