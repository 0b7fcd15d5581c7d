//! Cell drill-downs: the items behind one (row, month) value

use anyhow::Result;
use pnl_model::{CellTarget, Month, SalesLine, TaxName, TaxScenario};
use serde::Serialize;
use tracing::debug;

use crate::constants::DETAIL_ROW_LIMIT;
use crate::fetchers::{sales_branch, tax_item_selector, tax_label, tax_scenario_filter};
use crate::ledger::{ExpenseDetail, FinancialRevenueDetail, Ledger};
use crate::warehouse::{Branch, Grouping, ItemDetail, ItemQuery, Warehouse};

/// Rows behind a cell, largest first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "rows", rename_all = "snake_case")]
pub enum CellDetail {
    Items(Vec<ItemDetail>),
    Expenses(Vec<ExpenseDetail>),
    FinancialRevenue(Vec<FinancialRevenueDetail>),
}

impl CellDetail {
    pub fn len(&self) -> usize {
        match self {
            CellDetail::Items(rows) => rows.len(),
            CellDetail::Expenses(rows) => rows.len(),
            CellDetail::FinancialRevenue(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Products invoiced under a sales line in one month
pub fn sales_items_query(line: SalesLine) -> ItemQuery {
    ItemQuery {
        branch: sales_branch(line),
        grouping: Grouping::Product,
        nonzero_only: false,
        limit: DETAIL_ROW_LIMIT,
    }
}

/// Products carrying a tax under one scenario, return amounts sign-flipped
pub fn tax_items_query(tax: TaxName, scenario: TaxScenario) -> ItemQuery {
    ItemQuery {
        branch: Branch::new(tax_label(tax, scenario), tax_scenario_filter(scenario), tax_item_selector(tax))
            .scaled(scenario.factor()),
        grouping: Grouping::NormalizedProduct,
        nonzero_only: true,
        limit: DETAIL_ROW_LIMIT,
    }
}

pub async fn fetch_cell_detail<W, L>(warehouse: &W, ledger: &L, month: Month, target: &CellTarget) -> Result<CellDetail>
where
    W: Warehouse,
    L: Ledger,
{
    let detail = match target {
        CellTarget::Line { line } => CellDetail::Items(warehouse.items(month, &sales_items_query(*line)).await?),
        CellTarget::Tax { tax, scenario } => {
            CellDetail::Items(warehouse.items(month, &tax_items_query(*tax, *scenario)).await?)
        }
        CellTarget::Expense { group, category } => {
            CellDetail::Expenses(ledger.expense_details(month, group, category, DETAIL_ROW_LIMIT).await?)
        }
        CellTarget::FinancialRevenue { parent, category } => CellDetail::FinancialRevenue(
            ledger
                .financial_revenue_details(month, parent, category, DETAIL_ROW_LIMIT)
                .await?,
        ),
    };
    debug!(%month, ?target, rows = detail.len(), "cell detail fetched");
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::from_json(
            r#"{
                "invoice_lines": [
                    {"issued_on": "2025-01-10", "operation": "Saída", "purpose": "Normal/Venda",
                     "cancelled": "Não", "scenario": "Venda", "product": "FS - Bar (KG)",
                     "product_normalized": "Bar", "product_value": 100, "icms": 12},
                    {"issued_on": "2025-01-11", "operation": "Saída", "purpose": "Normal/Venda",
                     "cancelled": "Não", "scenario": "Venda", "product": "Gum",
                     "product_value": 40, "icms": 0},
                    {"issued_on": "2025-01-12", "operation": "Entrada", "purpose": "Devolução",
                     "cancelled": "Não", "scenario": "Venda", "product": "Gum", "product_value": 10, "icms": 3}
                ],
                "payables": [
                    {"entry_date": "2025-01-05", "category_code": "2.07.01", "group_description": "Operacionais",
                     "category": "Fretes", "status": "PAGO", "amount": "50", "supplier": "Carrier", "note": null},
                    {"entry_date": "2025-01-06", "category_code": "2.07.01", "group_description": "Operacionais",
                     "category": "Fretes", "status": "PAGO", "amount": 80, "supplier": null, "note": "March"}
                ],
                "postings": []
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sales_line_items_by_product() {
        let store = store();
        let month = Month::new(2025, 1).unwrap();
        let target = CellTarget::Line {
            line: SalesLine::GrossRevenue,
        };
        let CellDetail::Items(rows) = fetch_cell_detail(&store, &store, month, &target).await.unwrap() else {
            panic!("expected items");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "FS - Bar (KG)");
        assert_eq!(rows[0].total, 100.0);
        assert_eq!(rows[1].line_count, 1);
    }

    #[tokio::test]
    async fn test_tax_items_skip_zero_and_flip_returns() {
        let store = store();
        let month = Month::new(2025, 1).unwrap();

        let sale = CellTarget::Tax {
            tax: TaxName::Icms,
            scenario: TaxScenario::Sale,
        };
        let CellDetail::Items(rows) = fetch_cell_detail(&store, &store, month, &sale).await.unwrap() else {
            panic!("expected items");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "Bar");

        let ret = CellTarget::Tax {
            tax: TaxName::Icms,
            scenario: TaxScenario::Return,
        };
        let CellDetail::Items(rows) = fetch_cell_detail(&store, &store, month, &ret).await.unwrap() else {
            panic!("expected items");
        };
        assert_eq!(rows[0].total, -3.0);
    }

    #[tokio::test]
    async fn test_expense_entries_largest_first() {
        let store = store();
        let target = CellTarget::Expense {
            group: "2.07 + Operacionais".into(),
            category: "Fretes".into(),
        };
        let detail = fetch_cell_detail(&store, &store, Month::new(2025, 1).unwrap(), &target)
            .await
            .unwrap();
        let CellDetail::Expenses(rows) = detail else {
            panic!("expected expenses");
        };
        assert_eq!(rows.iter().map(|r| r.amount).collect::<Vec<_>>(), vec![80.0, 50.0]);
        assert_eq!(rows[0].note.as_deref(), Some("March"));
    }

    #[test]
    fn test_detail_json_shape() {
        let detail = CellDetail::Items(vec![ItemDetail {
            label: "Bar".into(),
            line_count: 2,
            total: 10.0,
        }]);
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["type"], "items");
        assert_eq!(json["rows"][0]["line_count"], 2);
    }
}
