//! CSLL and IRPJ under the presumed-profit regime
//!
//! Provisions are estimated per month from gross revenue (after returns),
//! service revenue and taxable financial revenue. The amount carried into net
//! profit is the ledger posting when there is one, otherwise the provision.

use pnl_model::MonthValues;

use crate::constants::{
    CSLL_PRESUMED_MARGIN, CSLL_RATE, CSLL_SERVICE_RATE, IRPJ_FINANCIAL_RATE, IRPJ_PRESUMED_MARGIN, IRPJ_RATE,
    IRPJ_SERVICE_RATE, IRPJ_SURCHARGE_RATE, IRPJ_SURCHARGE_THRESHOLD, SERVICE_REVENUE_CATEGORY,
    TAXABLE_FINANCIAL_PARENT,
};
use crate::ledger::{FinancialRevenueRow, LedgerRow};

pub fn provisioned_csll(gross_revenue: f64, service_revenue: f64, taxable_financial: f64) -> f64 {
    CSLL_RATE * CSLL_PRESUMED_MARGIN * gross_revenue
        + CSLL_SERVICE_RATE * service_revenue
        + CSLL_RATE * taxable_financial
}

pub fn provisioned_irpj(gross_revenue: f64, service_revenue: f64, taxable_financial: f64) -> f64 {
    let presumed_profit = IRPJ_PRESUMED_MARGIN * gross_revenue;
    let surcharge = IRPJ_SURCHARGE_RATE * (presumed_profit - IRPJ_SURCHARGE_THRESHOLD).max(0.0);
    IRPJ_RATE * presumed_profit
        + surcharge
        + IRPJ_FINANCIAL_RATE * taxable_financial
        + IRPJ_SERVICE_RATE * service_revenue
}

/// Posted amount when non-zero, the provision otherwise. Any posting, even
/// a partial one, replaces the whole provision for that month.
pub fn considered(posted: f64, provisioned: f64) -> f64 {
    if posted != 0.0 { posted } else { provisioned }
}

/// Per-month service revenue and taxable financial revenue
pub fn revenue_bases(rows: &[FinancialRevenueRow], year: i32) -> (MonthValues, MonthValues) {
    let mut service = MonthValues::zeroed(year);
    let mut taxable = MonthValues::zeroed(year);
    for row in rows {
        if row.code == SERVICE_REVENUE_CATEGORY {
            service.accumulate(row.period, row.amount);
        } else if row.parent_code == TAXABLE_FINANCIAL_PARENT {
            taxable.accumulate(row.period, row.amount);
        }
    }
    (service, taxable)
}

/// Income tax lines for one year
#[derive(Debug, Clone, PartialEq)]
pub struct IncomeTaxes {
    pub csll_posted: MonthValues,
    pub csll_provisioned: MonthValues,
    pub csll_considered: MonthValues,
    pub irpj_posted: MonthValues,
    pub irpj_provisioned: MonthValues,
    pub irpj_considered: MonthValues,
}

impl IncomeTaxes {
    /// `gross_revenue` is the gross revenue line after returns
    pub fn compute(
        gross_revenue: &MonthValues,
        financial_revenue: &[FinancialRevenueRow],
        tax_postings: &[LedgerRow],
    ) -> Self {
        let year = gross_revenue.year();
        let (service, taxable) = revenue_bases(financial_revenue, year);

        let mut csll_posted = MonthValues::zeroed(year);
        let mut irpj_posted = MonthValues::zeroed(year);
        for row in tax_postings {
            if row.category.contains("CSLL") {
                csll_posted.accumulate(row.period, row.amount);
            } else if row.category.contains("IRPJ") {
                irpj_posted.accumulate(row.period, row.amount);
            }
        }

        let csll_provisioned = MonthValues::from_fn(year, |m| {
            provisioned_csll(gross_revenue.get(m), service.get(m), taxable.get(m))
        });
        let irpj_provisioned = MonthValues::from_fn(year, |m| {
            provisioned_irpj(gross_revenue.get(m), service.get(m), taxable.get(m))
        });

        Self {
            csll_considered: csll_posted.zip_with(&csll_provisioned, considered),
            irpj_considered: irpj_posted.zip_with(&irpj_provisioned, considered),
            csll_posted,
            csll_provisioned,
            irpj_posted,
            irpj_provisioned,
        }
    }

    /// Considered CSLL plus considered IRPJ
    pub fn total(&self) -> MonthValues {
        self.csll_considered + self.irpj_considered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnl_model::Month;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_provision_formulas() {
        // 0.09 * 0.12 * 100000 + 0.0288 * 1000 + 0.09 * 500
        assert!(close(provisioned_csll(100_000.0, 1_000.0, 500.0), 1080.0 + 28.8 + 45.0));

        // presumed 8000: 1200 base, no surcharge, 125 financial, 48 service
        assert!(close(provisioned_irpj(100_000.0, 1_000.0, 500.0), 1200.0 + 125.0 + 48.0));

        // presumed 40000: 6000 base + 0.10 * 20000 surcharge
        assert!(close(provisioned_irpj(500_000.0, 0.0, 0.0), 8000.0));
    }

    #[test]
    fn test_considered_prefers_posting() {
        assert_eq!(considered(321.0, 999.0), 321.0);
        assert_eq!(considered(0.0, 999.0), 999.0);
        assert_eq!(considered(-5.0, 999.0), -5.0);
    }

    #[test]
    fn test_income_taxes_fall_back_per_month() {
        let jan = Month::new(2025, 1).unwrap();
        let feb = Month::new(2025, 2).unwrap();
        let mut gross = MonthValues::zeroed(2025);
        gross.set(jan, 100_000.0);
        gross.set(feb, 100_000.0);

        let postings = vec![
            LedgerRow {
                period: jan,
                group: "2.02 + Tributárias".into(),
                category: "CSLL a recolher".into(),
                amount: 700.0,
            },
            LedgerRow {
                period: feb,
                group: "2.02 + Tributárias".into(),
                category: "IRPJ a recolher".into(),
                amount: 900.0,
            },
        ];
        let financial = vec![FinancialRevenueRow {
            parent_code: "1.02".into(),
            parent_label: "Receitas financeiras".into(),
            code: "1.02.01".into(),
            label: "Serviços".into(),
            period: jan,
            amount: 1_000.0,
        }];

        let taxes = IncomeTaxes::compute(&gross, &financial, &postings);
        assert_eq!(taxes.csll_considered.get(jan), 700.0);
        assert!(close(taxes.csll_considered.get(feb), 1080.0));
        assert!(close(taxes.irpj_considered.get(jan), 1200.0 + 48.0));
        assert_eq!(taxes.irpj_considered.get(feb), 900.0);
        assert!(close(taxes.total().get(jan), 700.0 + 1248.0));
        assert_eq!(taxes.total().get(Month::new(2025, 3).unwrap()), 0.0);
    }
}
