//! In-memory backing store loaded from a JSON fixture file
//!
//! Evaluates warehouse queries and ledger reads over plain records with the
//! same filters the SQL stores apply. Backs `--fixtures` mode and the tests.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use pnl_model::Month;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::constants;
use crate::ledger::{ExpenseDetail, FinancialRevenueDetail, FinancialRevenueRow, Ledger, LedgerRow};
use crate::numeric::lenient_f64;
use crate::warehouse::{AggregateQuery, InvoiceLine, ItemDetail, ItemQuery, SeriesRow, Warehouse};

/// Accounts payable entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payable {
    pub entry_date: NaiveDate,
    /// Full category code, e.g. `2.07.03`
    pub category_code: String,
    /// Description of the two-segment parent category
    #[serde(default)]
    pub group_description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Payable {
    /// `"<code> + <parent description>"`, empty without a parent
    pub fn group_label(&self) -> String {
        let code: Vec<&str> = self.category_code.splitn(3, '.').take(2).collect();
        match &self.group_description {
            Some(description) => format!("{} + {}", code.join("."), description),
            None => String::new(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.status == constants::STATUS_CANCELLED
    }

    fn is_misfiled_return(&self) -> bool {
        self.group_description.as_deref() == Some(constants::MISFILED_RETURN_PARENT)
            && self.category.as_deref() == Some(constants::MISFILED_RETURN_CATEGORY)
    }

    fn is_income_tax(&self) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.starts_with("IRPJ") || c.starts_with("CSLL"))
    }
}

/// Current-account posting
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Posting {
    pub entry_id: String,
    /// `dd/mm/yyyy`, as the ERP stores it
    pub posted_on: String,
    pub parent_code: String,
    pub parent_label: String,
    pub code: String,
    pub label: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Posting {
    fn month(&self) -> Option<Month> {
        NaiveDate::parse_from_str(self.posted_on.trim(), "%d/%m/%Y")
            .ok()
            .map(Month::of_date)
    }

    fn is_financial_revenue(&self) -> bool {
        constants::FINANCIAL_REVENUE_PARENTS.contains(&self.parent_code.as_str())
            && !constants::FINANCIAL_REVENUE_EXCLUDED.contains(&self.code.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub invoice_lines: Vec<InvoiceLine>,
    #[serde(default)]
    pub payables: Vec<Payable>,
    #[serde(default)]
    pub postings: Vec<Posting>,
}

impl MemoryStore {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read fixture file: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse fixture file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    fn ledger_rows(&self, year: i32, keep: impl Fn(&Payable) -> bool) -> Vec<LedgerRow> {
        let mut totals: BTreeMap<(Month, String, String), f64> = BTreeMap::new();
        for payable in &self.payables {
            if payable.entry_date.year() != year || payable.is_cancelled() || !keep(payable) {
                continue;
            }
            let key = (
                Month::of_date(payable.entry_date),
                payable.group_label(),
                payable.category.clone().unwrap_or_default(),
            );
            *totals.entry(key).or_default() += payable.amount.unwrap_or(0.0);
        }
        totals
            .into_iter()
            .map(|((period, group, category), amount)| LedgerRow {
                period,
                group,
                category,
                amount,
            })
            .collect()
    }
}

impl Warehouse for MemoryStore {
    async fn aggregate(&self, year: i32, query: &AggregateQuery) -> Result<Vec<SeriesRow>> {
        let mut totals: BTreeMap<(Month, String, String), f64> = BTreeMap::new();
        for line in self.invoice_lines.iter().filter(|l| l.issued_on.year() == year) {
            for branch in &query.branches {
                if let Some(value) = branch.value(line) {
                    let key = (
                        Month::of_date(line.issued_on),
                        branch.series.clone(),
                        query.grouping.label(line),
                    );
                    *totals.entry(key).or_default() += value;
                }
            }
        }

        let mut rows: Vec<SeriesRow> = totals
            .into_iter()
            .map(|((period, series, label), amount)| SeriesRow {
                series,
                label,
                period,
                amount,
            })
            .collect();
        // Largest first within a month; series and label order breaks ties
        rows.sort_by(|a, b| a.period.cmp(&b.period).then_with(|| b.amount.total_cmp(&a.amount)));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn items(&self, month: Month, query: &ItemQuery) -> Result<Vec<ItemDetail>> {
        let mut groups: BTreeMap<String, (u64, f64)> = BTreeMap::new();
        for line in self.invoice_lines.iter().filter(|l| Month::of_date(l.issued_on) == month) {
            if query.nonzero_only && query.branch.selector.evaluate(line) == 0.0 {
                continue;
            }
            if let Some(value) = query.branch.value(line) {
                let entry = groups.entry(query.grouping.label(line)).or_default();
                entry.0 += 1;
                entry.1 += value;
            }
        }

        let mut items: Vec<ItemDetail> = groups
            .into_iter()
            .map(|(label, (line_count, total))| ItemDetail {
                label,
                line_count,
                total,
            })
            .collect();
        items.sort_by(|a, b| b.total.total_cmp(&a.total));
        items.truncate(query.limit);
        Ok(items)
    }
}

impl Ledger for MemoryStore {
    async fn expense_rows(&self, year: i32) -> Result<Vec<LedgerRow>> {
        Ok(self.ledger_rows(year, |p| !p.is_misfiled_return()))
    }

    async fn tax_expense_rows(&self, year: i32) -> Result<Vec<LedgerRow>> {
        Ok(self.ledger_rows(year, Payable::is_income_tax))
    }

    async fn financial_revenue_rows(&self, year: i32) -> Result<Vec<FinancialRevenueRow>> {
        let mut totals: BTreeMap<(Month, String, String, String, String), f64> = BTreeMap::new();
        for posting in self.postings.iter().filter(|p| p.is_financial_revenue()) {
            let Some(period) = posting.month().filter(|m| m.year() == year) else {
                continue;
            };
            let key = (
                period,
                posting.parent_code.clone(),
                posting.code.clone(),
                posting.parent_label.clone(),
                posting.label.clone(),
            );
            *totals.entry(key).or_default() += posting.amount.unwrap_or(0.0);
        }
        Ok(totals
            .into_iter()
            .map(
                |((period, parent_code, code, parent_label, label), amount)| FinancialRevenueRow {
                    parent_code,
                    parent_label,
                    code,
                    label,
                    period,
                    amount,
                },
            )
            .collect())
    }

    async fn expense_details(&self, month: Month, group: &str, category: &str, limit: usize) -> Result<Vec<ExpenseDetail>> {
        let mut details: Vec<ExpenseDetail> = self
            .payables
            .iter()
            .filter(|p| {
                Month::of_date(p.entry_date) == month
                    && !p.is_cancelled()
                    && p.group_label() == group
                    && p.category.as_deref() == Some(category)
            })
            .map(|p| ExpenseDetail {
                entry_date: p.entry_date.format("%Y-%m-%d").to_string(),
                supplier: p.supplier.clone(),
                note: p.note.clone(),
                status: p.status.clone(),
                amount: p.amount.unwrap_or(0.0),
            })
            .collect();
        details.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        details.truncate(limit);
        Ok(details)
    }

    async fn financial_revenue_details(
        &self,
        month: Month,
        parent_label: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<FinancialRevenueDetail>> {
        let mut details: Vec<FinancialRevenueDetail> = self
            .postings
            .iter()
            .filter(|p| p.month() == Some(month) && p.parent_label == parent_label && p.label == category)
            .map(|p| FinancialRevenueDetail {
                entry_id: p.entry_id.clone(),
                posted_on: p.posted_on.clone(),
                amount: p.amount.unwrap_or(0.0),
                note: p.note.clone(),
            })
            .collect();
        details.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        details.truncate(limit);
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{Branch, Column, Grouping, Scenario, Selector};

    fn store() -> MemoryStore {
        MemoryStore::from_json(
            r#"{
            "invoice_lines": [
                { "issued_on": "2025-01-10", "operation": "Saída", "purpose": "Normal/Venda", "cancelled": "Não",
                  "scenario": "Venda", "product": "FS - Widget (KG)", "family": "Snacks",
                  "product_value": "100", "freight": 5, "quantity": 2, "unit": "KG" },
                { "issued_on": "2025-01-20", "operation": "Saída", "purpose": "Normal/Venda", "cancelled": "Não",
                  "scenario": "Inativo", "product": "Widget", "family": "Snacks", "product_value": "oops" },
                { "issued_on": "2025-02-03", "operation": "Entrada", "purpose": "Devolução", "cancelled": "Não",
                  "scenario": "Venda", "product": "Widget", "family": "Snacks", "product_value": "1.234,50" },
                { "issued_on": "2024-12-31", "operation": "Saída", "purpose": "Normal/Venda", "cancelled": "Não",
                  "scenario": "Venda", "product_value": 999 }
            ],
            "payables": [
                { "entry_date": "2025-01-05", "category_code": "2.07.01", "group_description": "Operacionais",
                  "category": "Fretes", "status": "PAGO", "amount": 40, "supplier": "Carrier" },
                { "entry_date": "2025-01-06", "category_code": "2.07.01", "group_description": "Operacionais",
                  "category": "Fretes", "status": "A VENCER", "amount": 60 },
                { "entry_date": "2025-01-07", "category_code": "2.07.09", "group_description": "Operacionais",
                  "category": "Devolução", "status": "PAGO", "amount": 500 },
                { "entry_date": "2025-01-08", "category_code": "2.02.01", "group_description": "Impostos",
                  "category": "CSLL a recolher", "status": "PAGO", "amount": 80 },
                { "entry_date": "2025-01-09", "category_code": "2.02.01", "group_description": "Impostos",
                  "category": "CSLL a recolher", "status": "CANCELADO", "amount": 70 }
            ],
            "postings": [
                { "entry_id": "1", "posted_on": "15/03/2025", "parent_code": "1.02", "parent_label": "Receitas financeiras",
                  "code": "1.02.02", "label": "Rendimentos", "amount": "12,5" },
                { "entry_id": "2", "posted_on": "16/03/2025", "parent_code": "1.02", "parent_label": "Receitas financeiras",
                  "code": "1.02.98", "label": "Transferências", "amount": 1000 }
            ]
        }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_filters_and_sums() {
        let store = store();
        let query = AggregateQuery::new(vec![
            Branch::new("gross", Scenario::Sale, Selector::Sum(&[Column::ProductValue, Column::Freight])),
            Branch::new("returns", Scenario::Return, Selector::Sum(&[Column::ProductValue, Column::Freight])),
        ]);
        let rows = store.aggregate(2025, &query).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].series, "gross");
        assert_eq!(rows[0].period, Month::new(2025, 1).unwrap());
        assert_eq!(rows[0].amount, 105.0);
        assert_eq!(rows[1].series, "returns");
        assert_eq!(rows[1].amount, 1234.5);
    }

    #[tokio::test]
    async fn test_items_are_sorted_and_counted() {
        let store = store();
        let query = ItemQuery {
            branch: Branch::new("gross", Scenario::Sale, Selector::Sum(&[Column::ProductValue])),
            grouping: Grouping::Product,
            nonzero_only: false,
            limit: 300,
        };
        let items = store.items(Month::new(2025, 1).unwrap(), &query).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "FS - Widget (KG)");
        assert_eq!(items[0].total, 100.0);
        assert_eq!(items[1].line_count, 1);
        assert_eq!(items[1].total, 0.0);
    }

    #[tokio::test]
    async fn test_expense_rows_apply_ledger_filters() {
        let store = store();
        let rows = store.expense_rows(2025).await.unwrap();
        let fretes: Vec<_> = rows.iter().filter(|r| r.category == "Fretes").collect();
        assert_eq!(fretes.len(), 1);
        assert_eq!(fretes[0].group, "2.07 + Operacionais");
        assert_eq!(fretes[0].amount, 100.0);
        assert!(rows.iter().all(|r| r.category != "Devolução"));

        let taxes = store.tax_expense_rows(2025).await.unwrap();
        assert_eq!(taxes.len(), 1);
        assert_eq!(taxes[0].amount, 80.0);
    }

    #[tokio::test]
    async fn test_return_category_without_parent_is_kept() {
        let store = MemoryStore::from_json(
            r#"{
            "payables": [
                { "entry_date": "2025-01-07", "category_code": "2.07.09",
                  "category": "Devolução", "status": "PAGO", "amount": 25 }
            ]
        }"#,
        )
        .unwrap();
        let rows = store.expense_rows(2025).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, "");
        assert_eq!(rows[0].amount, 25.0);
    }

    #[tokio::test]
    async fn test_financial_revenue_excludes_leaf_codes() {
        let store = store();
        let rows = store.financial_revenue_rows(2025).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "1.02.02");
        assert_eq!(rows[0].amount, 12.5);
        assert_eq!(rows[0].period, Month::new(2025, 3).unwrap());

        let details = store
            .financial_revenue_details(Month::new(2025, 3).unwrap(), "Receitas financeiras", "Rendimentos", 300)
            .await
            .unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].posted_on, "15/03/2025");
    }

    #[tokio::test]
    async fn test_expense_details_largest_first() {
        let store = store();
        let details = store
            .expense_details(Month::new(2025, 1).unwrap(), "2.07 + Operacionais", "Fretes", 300)
            .await
            .unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].amount, 60.0);
        assert_eq!(details[1].supplier.as_deref(), Some("Carrier"));
    }
}
