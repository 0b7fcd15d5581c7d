//! Raw request parameters and their validation
//!
//! Every entry point receives strings (query parameters or CLI flags) and
//! turns them into typed values here, before any store is touched.

use chrono::Datelike;
use pnl_model::{CellTarget, Dimension, Month, SalesLine, TaxName, TaxScenario};
use serde::Deserialize;

use crate::constants::{MAX_YEAR, MIN_YEAR};
use crate::error::{PnlError, Result};

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(PnlError::bad_request(format!("missing parameter '{}'", name))),
    }
}

/// Year of a tree or breakdown request. Absent means the current year.
pub fn parse_year(raw: Option<&str>) -> Result<i32> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Ok(chrono::Local::now().year());
    }
    let year: i32 = raw
        .parse()
        .map_err(|_| PnlError::bad_request(format!("invalid year '{}'", raw)))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(PnlError::bad_request(format!(
            "year {} is outside {}..={}",
            year, MIN_YEAR, MAX_YEAR
        )));
    }
    Ok(year)
}

pub fn parse_month(raw: &str) -> Result<Month> {
    let month: Month = raw.parse()?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&month.year()) {
        return Err(PnlError::bad_request(format!("month {} is out of range", month)));
    }
    Ok(month)
}

/// `?year=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeParams {
    pub year: Option<String>,
}

impl TreeParams {
    pub fn year(&self) -> Result<i32> {
        parse_year(self.year.as_deref())
    }
}

/// `?year=&line=`, with the dimension taken from the path
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BreakdownParams {
    pub year: Option<String>,
    pub line: Option<String>,
}

impl BreakdownParams {
    pub fn parse(&self, dimension: &str) -> Result<(i32, SalesLine, Dimension)> {
        let dimension: Dimension = dimension.parse()?;
        let line: SalesLine = required(&self.line, "line")?.parse()?;
        Ok((parse_year(self.year.as_deref())?, line, dimension))
    }
}

/// `?month=&kind=` plus the fields of that kind:
///
/// - `line`: `line`
/// - `tax`: `tax`, `scenario`
/// - `expense`: `group`, `category`
/// - `financial_revenue`: `parent`, `category`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailParams {
    pub month: Option<String>,
    pub kind: Option<String>,
    pub line: Option<String>,
    pub tax: Option<String>,
    pub scenario: Option<String>,
    pub group: Option<String>,
    pub category: Option<String>,
    pub parent: Option<String>,
}

impl DetailParams {
    pub fn parse(&self) -> Result<(Month, CellTarget)> {
        let month = parse_month(required(&self.month, "month")?)?;
        let target = match required(&self.kind, "kind")? {
            "line" => CellTarget::Line {
                line: required(&self.line, "line")?.parse()?,
            },
            "tax" => {
                let tax: TaxName = required(&self.tax, "tax")?.parse()?;
                let scenario: TaxScenario = required(&self.scenario, "scenario")?.parse()?;
                CellTarget::Tax { tax, scenario }
            }
            "expense" => CellTarget::Expense {
                group: required(&self.group, "group")?.to_string(),
                category: required(&self.category, "category")?.to_string(),
            },
            "financial_revenue" => CellTarget::FinancialRevenue {
                parent: required(&self.parent, "parent")?.to_string(),
                category: required(&self.category, "category")?.to_string(),
            },
            other => return Err(PnlError::bad_request(format!("unknown detail kind '{}'", other))),
        };
        Ok((month, target))
    }
}
