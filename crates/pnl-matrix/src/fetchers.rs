//! Concept fetchers over the invoice warehouse
//!
//! Each financial concept is a fixed scenario filter and value selector.
//! Fetchers build the matching warehouse query and return plain
//! `(label, period, amount)` rows for the overlay and the tree builder.

use anyhow::Result;
use pnl_model::{BreakdownRequest, Dimension, Month, SalesLine, TaxFamily, TaxName, TaxScenario};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::warehouse::{AggregateQuery, Branch, Column, Grouping, Scenario, Selector, SeriesRow, Warehouse};

/// One fetched amount for a label and month. The label is empty for
/// single-account concepts.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub label: String,
    pub period: Month,
    pub amount: f64,
}

impl AggregateRow {
    pub fn new(label: impl Into<String>, period: Month, amount: f64) -> Self {
        Self {
            label: label.into(),
            period,
            amount,
        }
    }
}

impl From<SeriesRow> for AggregateRow {
    fn from(row: SeriesRow) -> Self {
        Self {
            label: row.label,
            period: row.period,
            amount: row.amount,
        }
    }
}

/// Rows per sales line, every requested line present
pub type LineRows = HashMap<SalesLine, Vec<AggregateRow>>;

const SALES_VALUE: Selector = Selector::Sum(&[Column::ProductValue, Column::Freight]);
const DISCOUNT_VALUE: Selector = Selector::Sum(&[Column::Discount]);
const COST_VALUE: Selector = Selector::Product(Column::UnitCost, Column::Quantity);
const VOLUME: Selector = Selector::Sum(&[Column::Quantity]);
const INTEREST_PENALTY: Selector = Selector::Sum(&[Column::InterestPenalty]);

// =============================================================================
// Sales Lines
// =============================================================================

/// Scenario filter and selector of a sales line
pub fn sales_branch(line: SalesLine) -> Branch {
    let series = line.id();
    match line {
        SalesLine::GrossRevenue => Branch::new(series, Scenario::Sale, SALES_VALUE),
        SalesLine::Returns => Branch::new(series, Scenario::Return, SALES_VALUE),
        SalesLine::Discount => Branch::new(series, Scenario::Sale, DISCOUNT_VALUE).positive_only(),
        SalesLine::Cogs => Branch::new(series, Scenario::Sale, COST_VALUE),
        SalesLine::CogsBonus => Branch::new(series, Scenario::Bonus, COST_VALUE),
        SalesLine::CogsLoss => Branch::new(series, Scenario::Loss, COST_VALUE),
        SalesLine::CogsReturn => Branch::new(series, Scenario::Return, COST_VALUE),
    }
}

/// Quantity branch behind a volume breakdown
fn volume_branch(line: SalesLine) -> Branch {
    let base = sales_branch(line);
    Branch::new(base.series, base.scenario, VOLUME)
}

/// Gross revenue, returns and discount in one query
pub async fn fetch_revenue_lines<W: Warehouse>(warehouse: &W, year: i32) -> Result<LineRows> {
    fetch_lines(
        warehouse,
        year,
        &[SalesLine::GrossRevenue, SalesLine::Returns, SalesLine::Discount],
    )
    .await
}

/// The four cost-of-goods variants in one query
pub async fn fetch_cogs_lines<W: Warehouse>(warehouse: &W, year: i32) -> Result<LineRows> {
    fetch_lines(
        warehouse,
        year,
        &[
            SalesLine::Cogs,
            SalesLine::CogsBonus,
            SalesLine::CogsLoss,
            SalesLine::CogsReturn,
        ],
    )
    .await
}

async fn fetch_lines<W: Warehouse>(warehouse: &W, year: i32, lines: &[SalesLine]) -> Result<LineRows> {
    let query = AggregateQuery::new(lines.iter().copied().map(sales_branch).collect());
    let rows = warehouse.aggregate(year, &query).await?;
    debug!(year, rows = rows.len(), "sales lines fetched");

    let mut by_line: LineRows = lines.iter().map(|line| (*line, Vec::new())).collect();
    for row in rows {
        match row.series.parse::<SalesLine>() {
            Ok(line) => by_line.entry(line).or_default().push(row.into()),
            Err(err) => warn!(%err, "dropping row for unknown sales line"),
        }
    }
    Ok(by_line)
}

// =============================================================================
// Taxes
// =============================================================================

/// Row label of a tax amount: `"<TAX>/<scenario>"`
pub fn tax_label(tax: TaxName, scenario: TaxScenario) -> String {
    format!("{}/{}", tax.code(), scenario.id())
}

pub fn parse_tax_label(label: &str) -> Option<(TaxName, TaxScenario)> {
    let (tax, scenario) = label.split_once('/')?;
    Some((tax.parse().ok()?, scenario.parse().ok()?))
}

/// Aggregate selector of a tax. FCP reads the destination-share ICMS column
/// and ICMS sums both shares plus the own ICMS column.
pub fn tax_selector(tax: TaxName) -> Selector {
    match tax {
        TaxName::Pis => Selector::Sum(&[Column::Pis]),
        TaxName::Cofins => Selector::Sum(&[Column::Cofins]),
        TaxName::Iss => Selector::Sum(&[Column::Iss]),
        TaxName::Ir => Selector::Sum(&[Column::Ir]),
        TaxName::Fcp => Selector::Sum(&[Column::IcmsDestination]),
        TaxName::Icms => Selector::Sum(&[Column::IcmsDestination, Column::IcmsSender, Column::Icms]),
        TaxName::Ipi => Selector::Sum(&[Column::Ipi]),
        TaxName::IcmsSt => Selector::Sum(&[Column::IcmsSt]),
        TaxName::FcpSt => Selector::Sum(&[Column::FcpSt]),
    }
}

/// Raw column itemized by tax drill-downs. FCP and ICMS read their own
/// columns here, unlike the aggregate.
pub fn tax_item_selector(tax: TaxName) -> Selector {
    match tax {
        TaxName::Pis => Selector::Sum(&[Column::Pis]),
        TaxName::Cofins => Selector::Sum(&[Column::Cofins]),
        TaxName::Iss => Selector::Sum(&[Column::Iss]),
        TaxName::Ir => Selector::Sum(&[Column::Ir]),
        TaxName::Fcp => Selector::Sum(&[Column::Fcp]),
        TaxName::Icms => Selector::Sum(&[Column::Icms]),
        TaxName::Ipi => Selector::Sum(&[Column::Ipi]),
        TaxName::IcmsSt => Selector::Sum(&[Column::IcmsSt]),
        TaxName::FcpSt => Selector::Sum(&[Column::FcpSt]),
    }
}

pub fn tax_scenario_filter(scenario: TaxScenario) -> Scenario {
    match scenario {
        TaxScenario::Sale => Scenario::Sale,
        TaxScenario::Bonus => Scenario::Bonus,
        TaxScenario::Return => Scenario::Return,
    }
}

/// Every tax of `family` under the sale, bonus and return branches, the
/// return branch sign-flipped. Labels are [`tax_label`]s.
pub async fn fetch_tax_rows<W: Warehouse>(warehouse: &W, year: i32, family: TaxFamily) -> Result<Vec<AggregateRow>> {
    let branches = TaxScenario::ALL
        .into_iter()
        .flat_map(|scenario| {
            family.taxes().iter().map(move |tax| {
                Branch::new(tax_label(*tax, scenario), tax_scenario_filter(scenario), tax_selector(*tax))
                    .scaled(scenario.factor())
            })
        })
        .collect();

    let rows = warehouse.aggregate(year, &AggregateQuery::new(branches)).await?;
    debug!(year, ?family, rows = rows.len(), "tax rows fetched");
    Ok(rows
        .into_iter()
        .map(|row| AggregateRow::new(row.series, row.period, row.amount))
        .collect())
}

// =============================================================================
// Other Concepts
// =============================================================================

/// Interest and penalty income charged on normal sales
pub async fn fetch_interest_income<W: Warehouse>(warehouse: &W, year: i32) -> Result<Vec<AggregateRow>> {
    let query = AggregateQuery::new(vec![Branch::new(
        "interest_income",
        Scenario::Sale,
        INTEREST_PENALTY,
    )]);
    let rows = warehouse.aggregate(year, &query).await?;
    Ok(rows.into_iter().map(AggregateRow::from).collect())
}

pub fn breakdown_grouping(dimension: Dimension) -> Grouping {
    match dimension {
        Dimension::Family => Grouping::Family,
        Dimension::Product => Grouping::Product,
        Dimension::VolumeFamily => Grouping::VolumeFamily,
        Dimension::VolumeProduct => Grouping::VolumeProduct,
    }
}

/// A sales line re-aggregated by family or product (amounts or volumes)
pub async fn fetch_breakdown<W: Warehouse>(
    warehouse: &W,
    year: i32,
    request: BreakdownRequest,
    limit: usize,
) -> Result<Vec<AggregateRow>> {
    let branch = if request.dimension().is_volume() {
        volume_branch(request.line())
    } else {
        sales_branch(request.line())
    };
    let query = AggregateQuery::new(vec![branch]).grouped(breakdown_grouping(request.dimension()), limit);
    let rows = warehouse.aggregate(year, &query).await?;
    debug!(
        year,
        line = %request.line(),
        dimension = %request.dimension(),
        rows = rows.len(),
        "breakdown rows fetched"
    );
    if rows.len() >= limit {
        warn!(
            year,
            line = %request.line(),
            dimension = %request.dimension(),
            limit,
            "breakdown hit the row cap; smaller groups were dropped"
        );
    }
    Ok(rows.into_iter().map(AggregateRow::from).collect())
}
