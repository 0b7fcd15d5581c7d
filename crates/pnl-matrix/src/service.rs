//! Entry points consumed by the HTTP surface and the CLI
//!
//! Every call is stateless apart from the correction source, which re-reads
//! its file when it changes. Upstream failures are logged here in full and
//! returned as [`PnlError::Upstream`].

use pnl_model::{BreakdownRequest, CellTarget, Dimension, Month, PnlNode, SalesLine};
use std::time::Instant;
use tracing::{error, info};

use crate::builder::{build_tree, fetch_year_inputs};
use crate::constants::BREAKDOWN_ROW_LIMIT;
use crate::details::{CellDetail, fetch_cell_detail};
use crate::error::{PnlError, Result};
use crate::fetchers::fetch_breakdown;
use crate::ledger::Ledger;
use crate::overlay::{CorrectionSource, CorrectionTarget};
use crate::pivot::{pivot, pivot_cogs_families};
use crate::warehouse::Warehouse;

pub struct PnlService<W, L> {
    warehouse: W,
    ledger: L,
    corrections: CorrectionSource,
}

fn upstream(operation: &str, err: anyhow::Error) -> PnlError {
    error!(operation, "{:#}", err);
    PnlError::Upstream(err)
}

impl<W: Warehouse, L: Ledger> PnlService<W, L> {
    pub fn new(warehouse: W, ledger: L, corrections: CorrectionSource) -> Self {
        Self {
            warehouse,
            ledger,
            corrections,
        }
    }

    /// Full ordered tree for one year. Any failing fetch fails the build.
    pub async fn build_year_tree(&self, year: i32) -> Result<Vec<PnlNode>> {
        let started = Instant::now();
        let corrections = self
            .corrections
            .current()
            .map_err(|err| upstream("load corrections", err))?;

        let inputs = fetch_year_inputs(&self.warehouse, &self.ledger, year)
            .await
            .map_err(|err| upstream("build year tree", err))?;
        let tree = build_tree(year, &inputs.with_corrections(&corrections, year));

        info!(
            year,
            nodes = tree.len(),
            corrections = corrections.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "year tree built"
        );
        Ok(tree)
    }

    pub async fn family_breakdown(&self, year: i32, line: SalesLine) -> Result<Vec<PnlNode>> {
        self.breakdown(year, BreakdownRequest::new(line, Dimension::Family)?).await
    }

    pub async fn product_breakdown(&self, year: i32, line: SalesLine) -> Result<Vec<PnlNode>> {
        self.breakdown(year, BreakdownRequest::new(line, Dimension::Product)?).await
    }

    pub async fn volume_family_breakdown(&self, year: i32, line: SalesLine) -> Result<Vec<PnlNode>> {
        self.breakdown(year, BreakdownRequest::new(line, Dimension::VolumeFamily)?)
            .await
    }

    pub async fn volume_product_breakdown(&self, year: i32, line: SalesLine) -> Result<Vec<PnlNode>> {
        self.breakdown(year, BreakdownRequest::new(line, Dimension::VolumeProduct)?)
            .await
    }

    /// Rows a breakdown placeholder expands into. The COGS family breakdown
    /// is published together with each family's share of family revenue.
    pub async fn breakdown(&self, year: i32, request: BreakdownRequest) -> Result<Vec<PnlNode>> {
        let corrections = self
            .corrections
            .current()
            .map_err(|err| upstream("load corrections", err))?;

        let nodes = if request.line() == SalesLine::Cogs && request.dimension() == Dimension::Family {
            let revenue_request = BreakdownRequest::new(SalesLine::GrossRevenue, Dimension::Family)?;
            let (cogs_rows, revenue_rows) = tokio::try_join!(
                fetch_breakdown(&self.warehouse, year, request, BREAKDOWN_ROW_LIMIT),
                fetch_breakdown(&self.warehouse, year, revenue_request, BREAKDOWN_ROW_LIMIT),
            )
            .map_err(|err| upstream("fetch breakdown", err))?;

            let cogs_rows = corrections.apply(CorrectionTarget::Breakdown(request), year, cogs_rows);
            let revenue_rows = corrections.apply(CorrectionTarget::Breakdown(revenue_request), year, revenue_rows);
            pivot_cogs_families(&cogs_rows, &revenue_rows, request, year)
        } else {
            let rows = fetch_breakdown(&self.warehouse, year, request, BREAKDOWN_ROW_LIMIT)
                .await
                .map_err(|err| upstream("fetch breakdown", err))?;
            let rows = corrections.apply(CorrectionTarget::Breakdown(request), year, rows);
            pivot(&rows, request, year)
        };

        info!(
            year,
            line = %request.line(),
            dimension = %request.dimension(),
            nodes = nodes.len(),
            "breakdown built"
        );
        Ok(nodes)
    }

    /// Items behind one (row, month) cell
    pub async fn cell_detail(&self, month: Month, target: &CellTarget) -> Result<CellDetail> {
        match target {
            CellTarget::Expense { group, category } | CellTarget::FinancialRevenue { parent: group, category } => {
                if group.trim().is_empty() || category.trim().is_empty() {
                    return Err(PnlError::bad_request("group and category labels are required"));
                }
            }
            CellTarget::Line { .. } | CellTarget::Tax { .. } => {}
        }

        fetch_cell_detail(&self.warehouse, &self.ledger, month, target)
            .await
            .map_err(|err| upstream("fetch cell detail", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::MemoryStore;
    use crate::ledger::{ExpenseDetail, FinancialRevenueDetail, FinancialRevenueRow, LedgerRow};
    use crate::warehouse::{AggregateQuery, ItemDetail, ItemQuery, SeriesRow};
    use pnl_model::NodeKind;

    /// Store whose every call fails
    struct Unreachable;

    impl Warehouse for Unreachable {
        async fn aggregate(&self, _year: i32, _query: &AggregateQuery) -> anyhow::Result<Vec<SeriesRow>> {
            anyhow::bail!("connection refused")
        }

        async fn items(&self, _month: Month, _query: &ItemQuery) -> anyhow::Result<Vec<ItemDetail>> {
            anyhow::bail!("connection refused")
        }
    }

    impl Ledger for Unreachable {
        async fn expense_rows(&self, _year: i32) -> anyhow::Result<Vec<LedgerRow>> {
            anyhow::bail!("connection refused")
        }

        async fn tax_expense_rows(&self, _year: i32) -> anyhow::Result<Vec<LedgerRow>> {
            anyhow::bail!("connection refused")
        }

        async fn financial_revenue_rows(&self, _year: i32) -> anyhow::Result<Vec<FinancialRevenueRow>> {
            anyhow::bail!("connection refused")
        }

        async fn expense_details(
            &self,
            _month: Month,
            _group: &str,
            _category: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<ExpenseDetail>> {
            anyhow::bail!("connection refused")
        }

        async fn financial_revenue_details(
            &self,
            _month: Month,
            _parent_label: &str,
            _category: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<FinancialRevenueDetail>> {
            anyhow::bail!("connection refused")
        }
    }

    fn service() -> PnlService<MemoryStore, MemoryStore> {
        let store = MemoryStore::from_json(
            r#"{
                "invoice_lines": [
                    {"issued_on": "2025-01-10", "operation": "Saída", "purpose": "Normal/Venda",
                     "cancelled": "Não", "scenario": "Venda", "product": "Bar", "family": "Snacks",
                     "product_value": 200, "unit_cost": 10, "quantity": 5},
                    {"issued_on": "2025-01-11", "operation": "Saída", "purpose": "Normal/Venda",
                     "cancelled": "Não", "scenario": "Venda", "product": "Cola", "family": "Drinks",
                     "product_value": 100, "unit_cost": 4, "quantity": 10}
                ]
            }"#,
        )
        .unwrap();
        PnlService::new(store.clone(), store, CorrectionSource::none())
    }

    #[tokio::test]
    async fn test_upstream_failure_fails_whole_build() {
        let service = PnlService::new(Unreachable, Unreachable, CorrectionSource::none());
        let err = service.build_year_tree(2025).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn test_unsupported_breakdown_is_rejected_before_io() {
        let service = PnlService::new(Unreachable, Unreachable, CorrectionSource::none());
        let err = service
            .volume_family_breakdown(2025, SalesLine::Discount)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_cogs_family_breakdown_carries_percentages() {
        let nodes = service().family_breakdown(2025, SalesLine::Cogs).await.unwrap();
        let summary: Vec<(&str, NodeKind)> = nodes.iter().map(|n| (n.label.as_str(), n.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("Drinks", NodeKind::Family),
                ("", NodeKind::DetailPercentage),
                ("Snacks", NodeKind::Family),
                ("", NodeKind::DetailPercentage),
            ]
        );
        let jan = Month::new(2025, 1).unwrap();
        assert_eq!(nodes[1].values.get(jan), 40.0);
        assert_eq!(nodes[3].values.get(jan), 25.0);
    }

    #[tokio::test]
    async fn test_blank_expense_detail_is_bad_request() {
        let target = CellTarget::Expense {
            group: " ".into(),
            category: "Fretes".into(),
        };
        let err = service()
            .cell_detail(Month::new(2025, 1).unwrap(), &target)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
}
