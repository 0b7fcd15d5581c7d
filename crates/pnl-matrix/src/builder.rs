//! Year tree construction
//!
//! [`fetch_year_inputs`] issues every top-level fetch concurrently and
//! [`build_tree`] turns the (corrected) results into the ordered node list.
//! The formula chain runs strictly top to bottom: each computed line reads
//! only lines computed before it.

use anyhow::Result;
use pnl_model::{
    AccountLine, CellTarget, ExpenseGroup, FinancialRevenueCategory, FinancialRevenueGroup, MonthValues,
    NodeKind, NodeMeta, PnlNode, SalesLine, Sign, TaxFamily, TaxName, TaxScenario, expense_category_id, expense_group_id,
};
use std::collections::HashMap;
use tracing::warn;

use crate::constants;
use crate::fetchers::{self, AggregateRow, LineRows};
use crate::ledger::{FinancialRevenueRow, Ledger, LedgerRow};
use crate::overlay::{CorrectionSet, CorrectionTarget};
use crate::provision::IncomeTaxes;
use crate::warehouse::Warehouse;

// =============================================================================
// Inputs
// =============================================================================

/// Everything one year tree is built from
#[derive(Debug, Clone, Default)]
pub struct YearInputs {
    /// Gross revenue, returns, discount
    pub revenue: LineRows,
    /// The four cost-of-goods variants
    pub cogs: LineRows,
    pub revenue_taxes: Vec<AggregateRow>,
    pub st_taxes: Vec<AggregateRow>,
    pub expenses: Vec<LedgerRow>,
    pub financial_revenue: Vec<FinancialRevenueRow>,
    pub interest_income: Vec<AggregateRow>,
    pub tax_expenses: Vec<LedgerRow>,
}

/// Issue all top-level fetches at once. The first failure fails the year.
pub async fn fetch_year_inputs<W, L>(warehouse: &W, ledger: &L, year: i32) -> Result<YearInputs>
where
    W: Warehouse,
    L: Ledger,
{
    let (revenue, cogs, revenue_taxes, st_taxes, expenses, financial_revenue, interest_income, tax_expenses) = tokio::try_join!(
        fetchers::fetch_revenue_lines(warehouse, year),
        fetchers::fetch_cogs_lines(warehouse, year),
        fetchers::fetch_tax_rows(warehouse, year, TaxFamily::Revenue),
        fetchers::fetch_tax_rows(warehouse, year, TaxFamily::St),
        ledger.expense_rows(year),
        ledger.financial_revenue_rows(year),
        fetchers::fetch_interest_income(warehouse, year),
        ledger.tax_expense_rows(year),
    )?;

    Ok(YearInputs {
        revenue,
        cogs,
        revenue_taxes,
        st_taxes,
        expenses,
        financial_revenue,
        interest_income,
        tax_expenses,
    })
}

impl YearInputs {
    /// Merge the corrections for `year` into each sales line and tax family.
    /// Consumes the inputs so a set cannot be applied twice to the same rows.
    pub fn with_corrections(mut self, corrections: &CorrectionSet, year: i32) -> Self {
        for line in SalesLine::ALL {
            let by_line = match line {
                SalesLine::GrossRevenue | SalesLine::Returns | SalesLine::Discount => &mut self.revenue,
                _ => &mut self.cogs,
            };
            let rows = by_line.entry(line).or_default();
            *rows = corrections.apply(CorrectionTarget::Line(line), year, std::mem::take(rows));
        }
        self.revenue_taxes = corrections.apply(
            CorrectionTarget::Taxes(TaxFamily::Revenue),
            year,
            std::mem::take(&mut self.revenue_taxes),
        );
        self.st_taxes = corrections.apply(
            CorrectionTarget::Taxes(TaxFamily::St),
            year,
            std::mem::take(&mut self.st_taxes),
        );
        self
    }

    fn line(&self, line: SalesLine, year: i32) -> MonthValues {
        let rows = self.revenue.get(&line).or_else(|| self.cogs.get(&line));
        rows.map(|rows| monthly(rows, year)).unwrap_or_else(|| MonthValues::zeroed(year))
    }
}

/// Sum rows per month of `year`
pub fn monthly(rows: &[AggregateRow], year: i32) -> MonthValues {
    let mut values = MonthValues::zeroed(year);
    for row in rows {
        values.accumulate(row.period, row.amount);
    }
    values
}

// =============================================================================
// Tax Subtrees
// =============================================================================

/// A tax family root followed by its children
#[derive(Debug, Clone)]
pub struct TaxTree {
    pub root: PnlNode,
    pub children: Vec<PnlNode>,
}

fn tax_child_label(tax: TaxName, scenario: TaxScenario) -> String {
    match scenario {
        TaxScenario::Sale => tax.code().to_string(),
        other => format!("{} {}", tax.code(), other.id()),
    }
}

/// One child per (tax, scenario). All IPI rows collapse into `tax_ipi`, which
/// is listed first and does not count toward the root.
pub fn build_tax_tree(family: TaxFamily, rows: &[AggregateRow], year: i32) -> TaxTree {
    let root_line = family.root();
    let mut root = PnlNode::line(root_line, MonthValues::zeroed(year));
    let mut ipi: Option<PnlNode> = None;
    let mut children: Vec<PnlNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some((tax, scenario)) = fetchers::parse_tax_label(&row.label) else {
            warn!(label = %row.label, "dropping tax row with unknown label");
            continue;
        };

        if tax == TaxName::Ipi {
            ipi.get_or_insert_with(|| {
                PnlNode::line(AccountLine::TaxIpi, MonthValues::zeroed(year)).with_parent(root_line.id())
            })
            .values
            .accumulate(row.period, row.amount);
            continue;
        }

        let id = format!("{}.{}.{}", root_line.id(), tax.code(), scenario.id());
        let slot = *index.entry(id.clone()).or_insert_with(|| {
            children.push(
                PnlNode::new(
                    id,
                    tax_child_label(tax, scenario),
                    scenario.node_sign(),
                    NodeKind::Plain,
                    MonthValues::zeroed(year),
                )
                .with_parent(root_line.id())
                .with_meta(NodeMeta::Drilldown {
                    target: CellTarget::Tax { tax, scenario },
                }),
            );
            children.len() - 1
        });
        children[slot].values.accumulate(row.period, row.amount);
        root.values.accumulate(row.period, row.amount);
    }

    TaxTree {
        root,
        children: ipi.into_iter().chain(children).collect(),
    }
}

// =============================================================================
// Expense Groups
// =============================================================================

/// Ledger groups (first-seen order) and their category children
#[derive(Debug, Clone, Default)]
pub struct ExpenseTree {
    pub groups: Vec<PnlNode>,
    pub categories: Vec<PnlNode>,
}

/// PIS, COFINS and ICMS lines under the disregarded group duplicate the
/// revenue taxes.
pub fn is_ignored_tax_expense(group: &str, category: &str) -> bool {
    if ExpenseGroup::from_label(group) != Some(ExpenseGroup::Disregarded) {
        return false;
    }
    let category = category.trim().to_uppercase();
    category == "PIS" || category == "COFINS" || category.starts_with("ICMS")
}

fn is_income_tax_category(category: &str) -> bool {
    category.contains("CSLL") || category.contains("IRPJ")
}

pub fn build_expense_tree(rows: &[LedgerRow], year: i32) -> ExpenseTree {
    let mut tree = ExpenseTree::default();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut category_index: HashMap<(String, String), usize> = HashMap::new();

    for row in rows {
        if is_ignored_tax_expense(&row.group, &row.category)
            || row.group.is_empty()
            || row.category.is_empty()
            || is_income_tax_category(&row.category)
        {
            continue;
        }

        let group_slot = *group_index.entry(row.group.clone()).or_insert_with(|| {
            tree.groups.push(PnlNode::new(
                expense_group_id(&row.group),
                row.group.clone(),
                Sign::Minus,
                NodeKind::Plain,
                MonthValues::zeroed(year),
            ));
            tree.groups.len() - 1
        });
        tree.groups[group_slot].values.accumulate(row.period, row.amount);

        let key = (row.group.clone(), row.category.clone());
        let category_slot = *category_index.entry(key).or_insert_with(|| {
            tree.categories.push(
                PnlNode::new(
                    expense_category_id(&row.group, &row.category),
                    row.category.clone(),
                    Sign::Minus,
                    NodeKind::Plain,
                    MonthValues::zeroed(year),
                )
                .with_parent(expense_group_id(&row.group))
                .with_meta(NodeMeta::Drilldown {
                    target: CellTarget::Expense {
                        group: row.group.clone(),
                        category: row.category.clone(),
                    },
                }),
            );
            tree.categories.len() - 1
        });
        tree.categories[category_slot].values.accumulate(row.period, row.amount);
    }
    tree
}

impl ExpenseTree {
    /// First group whose code matches `group`
    fn position(&self, group: ExpenseGroup) -> Option<usize> {
        self.groups
            .iter()
            .position(|node| ExpenseGroup::from_label(&node.label) == Some(group))
    }

    fn designated(&self, group: ExpenseGroup) -> Option<&PnlNode> {
        self.position(group).map(|i| &self.groups[i])
    }

    /// Values of a designated group, zero when the ledger has none
    pub fn values(&self, group: ExpenseGroup, year: i32) -> MonthValues {
        self.designated(group)
            .map(|node| node.values)
            .unwrap_or_else(|| MonthValues::zeroed(year))
    }

    /// The designation a group node stands for, if it is the first of its code
    fn designation_of(&self, index: usize) -> Option<ExpenseGroup> {
        let group = ExpenseGroup::from_label(&self.groups[index].label)?;
        (self.position(group) == Some(index)).then_some(group)
    }
}

// =============================================================================
// Financial Revenue
// =============================================================================

/// Financial revenue line: ledger postings plus interest and penalty income,
/// with per-parent groups in its meta.
pub fn build_financial_revenue(rows: &[FinancialRevenueRow], interest: &[AggregateRow], year: i32) -> PnlNode {
    let mut groups: Vec<FinancialRevenueGroup> = Vec::new();
    for row in rows {
        let group_slot = match groups.iter().position(|g| g.label == row.parent_label) {
            Some(slot) => slot,
            None => {
                groups.push(FinancialRevenueGroup {
                    label: row.parent_label.clone(),
                    values: MonthValues::zeroed(year),
                    categories: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[group_slot];
        group.values.accumulate(row.period, row.amount);

        let category_slot = match group.categories.iter().position(|c| c.label == row.label) {
            Some(slot) => slot,
            None => {
                group.categories.push(FinancialRevenueCategory {
                    label: row.label.clone(),
                    values: MonthValues::zeroed(year),
                });
                group.categories.len() - 1
            }
        };
        group.categories[category_slot]
            .values
            .accumulate(row.period, row.amount);
    }

    let interest_values = monthly(interest, year);
    groups.push(FinancialRevenueGroup {
        label: constants::INTEREST_INCOME_LABEL.to_string(),
        values: interest_values,
        categories: Vec::new(),
    });

    let total = groups
        .iter()
        .fold(MonthValues::zeroed(year), |acc, group| acc + group.values);
    PnlNode::line(AccountLine::FinancialRevenue, total).with_meta(NodeMeta::FinancialRevenue { groups })
}

// =============================================================================
// Tree
// =============================================================================

fn sales_node(line: SalesLine, values: MonthValues) -> PnlNode {
    PnlNode::line(line.account(), values).with_meta(NodeMeta::Drilldown {
        target: CellTarget::Line { line },
    })
}

/// `<id>.pct_gross`: the line as a percentage of gross revenue
fn percent_row(node: &PnlNode, gross_revenue: &MonthValues) -> PnlNode {
    PnlNode::new(
        format!("{}.pct_gross", node.id),
        "",
        Sign::Plus,
        NodeKind::DetailPercentage,
        node.values.percent_of(gross_revenue),
    )
}

/// Build the ordered node list for `year`
pub fn build_tree(year: i32, inputs: &YearInputs) -> Vec<PnlNode> {
    // Sales lines; gross revenue is reported net of returns
    let returns_values = inputs.line(SalesLine::Returns, year);
    let gross_values = inputs.line(SalesLine::GrossRevenue, year) - returns_values;
    let discount_values = inputs.line(SalesLine::Discount, year);

    let gross = sales_node(SalesLine::GrossRevenue, gross_values);
    let returns = sales_node(SalesLine::Returns, returns_values);
    let discount = sales_node(SalesLine::Discount, discount_values);

    let revenue_taxes = build_tax_tree(TaxFamily::Revenue, &inputs.revenue_taxes, year);
    let st_taxes = build_tax_tree(TaxFamily::St, &inputs.st_taxes, year);

    let net_revenue_values = gross_values - revenue_taxes.root.values - discount_values;
    let net_revenue = PnlNode::line(AccountLine::NetRevenue, net_revenue_values);

    let cogs_lines: Vec<PnlNode> = [
        SalesLine::Cogs,
        SalesLine::CogsBonus,
        SalesLine::CogsLoss,
        SalesLine::CogsReturn,
    ]
    .into_iter()
    .map(|line| sales_node(line, inputs.line(line, year)))
    .collect();
    let cogs_values = |i: usize| cogs_lines[i].values;

    let expenses = build_expense_tree(&inputs.expenses, year);
    let group = |g: ExpenseGroup| expenses.values(g, year);

    // Intermediate chain
    let margin = net_revenue_values.percent_of(&gross_values);

    let operating_income = net_revenue_values - cogs_values(0) - cogs_values(1) - cogs_values(2) + cogs_values(3);
    let operating_margin = operating_income.percent_of(&gross_values);

    let gross_profit = operating_income - group(ExpenseGroup::Operating);
    let gross_profit_margin = gross_profit.percent_of(&gross_values);

    let ebitda = ExpenseGroup::COST_CENTERS
        .into_iter()
        .fold(operating_income, |acc, g| acc - group(g));
    let ebitda_margin = ebitda.percent_of(&net_revenue_values);

    let income_taxes = IncomeTaxes::compute(&gross_values, &inputs.financial_revenue, &inputs.tax_expenses);
    let financial_revenue = build_financial_revenue(&inputs.financial_revenue, &inputs.interest_income, year);

    let mut net_profit = ebitda - group(ExpenseGroup::Financial) - group(ExpenseGroup::Tax);
    net_profit += financial_revenue.values;
    net_profit -= income_taxes.total();
    let net_profit_margin = net_profit.percent_of(&net_revenue_values);

    // Presentation order
    let mut out: Vec<PnlNode> = Vec::new();

    out.push(gross);
    out.push(PnlNode::line(AccountLine::GrossRevenueVolumes, MonthValues::zeroed(year)));
    out.push(returns);
    out.push(PnlNode::line(AccountLine::ReturnsVolumes, MonthValues::zeroed(year)));

    let revenue_taxes_pct = percent_row(&revenue_taxes.root, &gross_values);
    out.push(revenue_taxes.root);
    out.push(revenue_taxes_pct);
    out.extend(revenue_taxes.children);
    out.push(st_taxes.root);
    out.extend(st_taxes.children);

    let discount_pct = percent_row(&discount, &gross_values);
    out.push(discount);
    out.push(discount_pct);

    out.push(net_revenue);
    out.push(PnlNode::line(AccountLine::NetRevenueMargin, margin));

    for line in cogs_lines {
        let pct = percent_row(&line, &gross_values);
        out.push(line);
        out.push(pct);
    }

    out.push(PnlNode::line(AccountLine::OperatingIncome, operating_income));
    out.push(PnlNode::line(AccountLine::OperatingIncomeMargin, operating_margin));

    let with_percent = |out: &mut Vec<PnlNode>, node: &PnlNode| {
        out.push(node.clone());
        out.push(percent_row(node, &gross_values));
    };

    if let Some(node) = expenses.designated(ExpenseGroup::Operating) {
        with_percent(&mut out, node);
    }

    out.push(PnlNode::line(AccountLine::GrossProfit, gross_profit));
    out.push(PnlNode::line(AccountLine::GrossProfitMargin, gross_profit_margin));

    if let Some(node) = expenses.designated(ExpenseGroup::Import) {
        with_percent(&mut out, node);
    }

    for (index, node) in expenses.groups.iter().enumerate() {
        match expenses.designation_of(index) {
            Some(
                ExpenseGroup::Import
                | ExpenseGroup::Operating
                | ExpenseGroup::Financial
                | ExpenseGroup::Tax
                | ExpenseGroup::Disregarded,
            ) => {}
            Some(designated) if designated.has_percent_row() => with_percent(&mut out, node),
            _ => out.push(node.clone()),
        }
    }

    out.push(PnlNode::line(AccountLine::Ebitda, ebitda));
    out.push(PnlNode::line(AccountLine::EbitdaMargin, ebitda_margin));

    if let Some(node) = expenses.designated(ExpenseGroup::Financial) {
        with_percent(&mut out, node);
    }
    out.push(financial_revenue);

    if let Some(node) = expenses.designated(ExpenseGroup::Tax) {
        out.push(node.clone());
    }

    let income_root = AccountLine::IncomeTaxes.id();
    out.push(PnlNode::line(AccountLine::IncomeTaxes, income_taxes.total()));
    for (line, values) in [
        (AccountLine::CsllConsidered, income_taxes.csll_considered),
        (AccountLine::CsllPosted, income_taxes.csll_posted),
        (AccountLine::CsllProvisioned, income_taxes.csll_provisioned),
        (AccountLine::IrpjConsidered, income_taxes.irpj_considered),
        (AccountLine::IrpjPosted, income_taxes.irpj_posted),
        (AccountLine::IrpjProvisioned, income_taxes.irpj_provisioned),
    ] {
        out.push(PnlNode::line(line, values).with_parent(income_root));
    }

    out.push(PnlNode::line(AccountLine::NetProfit, net_profit));
    out.push(PnlNode::line(AccountLine::NetProfitMargin, net_profit_margin));

    if let Some(node) = expenses.designated(ExpenseGroup::Disregarded) {
        out.push(node.clone());
    }
    out.extend(expenses.categories);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnl_model::Month;

    const YEAR: i32 = 2025;

    fn m(month: u32) -> Month {
        Month::new(YEAR, month).unwrap()
    }

    fn row(label: &str, month: u32, amount: f64) -> AggregateRow {
        AggregateRow::new(label, m(month), amount)
    }

    fn ledger(group: &str, category: &str, month: u32, amount: f64) -> LedgerRow {
        LedgerRow {
            period: m(month),
            group: group.to_string(),
            category: category.to_string(),
            amount,
        }
    }

    fn inputs(gross: Vec<AggregateRow>, returns: Vec<AggregateRow>, discount: Vec<AggregateRow>) -> YearInputs {
        YearInputs {
            revenue: [
                (SalesLine::GrossRevenue, gross),
                (SalesLine::Returns, returns),
                (SalesLine::Discount, discount),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    fn find<'a>(nodes: &'a [PnlNode], id: &str) -> &'a PnlNode {
        nodes
            .iter()
            .find(|n| n.id == id)
            .unwrap_or_else(|| panic!("missing node {}", id))
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut inputs = inputs(
            vec![row("", 1, 500.0), row("", 2, 600.0)],
            vec![row("", 1, 50.0)],
            vec![row("", 1, 10.0)],
        );
        inputs.revenue_taxes = vec![row("ICMS/sale", 1, 25.0)];

        let nodes = build_tree(YEAR, &inputs);
        let gross = find(&nodes, "gross_revenue");
        assert_eq!(gross.values.get(m(1)), 450.0);
        assert_eq!(gross.values.get(m(2)), 600.0);
        assert_eq!(find(&nodes, "net_revenue").values.get(m(1)), 415.0);

        let margin = find(&nodes, "net_revenue_margin").values.get(m(1));
        assert!((margin - 415.0 / 450.0 * 100.0).abs() < 1e-9);
        assert!((margin - 92.22).abs() < 0.01);
    }

    #[test]
    fn test_net_revenue_formula() {
        let mut inputs = inputs(vec![row("", 3, 1000.0)], vec![row("", 3, 100.0)], vec![row("", 3, 20.0)]);
        inputs.revenue_taxes = vec![row("PIS/sale", 3, 30.0), row("Cofins/sale", 3, 20.0)];

        let nodes = build_tree(YEAR, &inputs);
        assert_eq!(find(&nodes, "revenue_taxes").values.get(m(3)), 50.0);
        assert_eq!(find(&nodes, "net_revenue").values.get(m(3)), 830.0);

        // Margin is taken over gross revenue after returns (900)
        let margin = find(&nodes, "net_revenue_margin").values.get(m(3));
        assert!((margin - 830.0 / 900.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_every_node_has_twelve_finite_months() {
        let mut inputs = inputs(vec![row("", 1, 100.0)], vec![], vec![]);
        inputs.expenses = vec![ledger("2.07 + Operacionais", "Fretes", 2, 30.0)];
        let nodes = build_tree(YEAR, &inputs);
        for node in &nodes {
            assert_eq!(node.values.iter().count(), 12, "{}", node.id);
            assert!(node.values.iter().all(|(month, v)| month.year() == YEAR && v.is_finite()));
        }
        // Ids are unique
        let mut ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), nodes.len());
    }

    #[test]
    fn test_zero_gross_revenue_gives_zero_percentages() {
        let mut inputs = inputs(vec![], vec![], vec![row("", 1, 10.0)]);
        inputs.cogs.insert(SalesLine::Cogs, vec![row("", 1, 40.0)]);
        let nodes = build_tree(YEAR, &inputs);
        for node in nodes.iter().filter(|n| n.kind.is_ratio()) {
            assert_eq!(node.values.get(m(1)), 0.0, "{}", node.id);
        }
    }

    #[test]
    fn test_ipi_collapses_into_one_child() {
        let taxes = vec![
            row("IPI/sale", 1, 30.0),
            row("ICMS/sale", 1, 100.0),
            row("IPI/return", 1, -5.0),
            row("ICMS/return", 1, -10.0),
        ];
        let tree = build_tax_tree(TaxFamily::Revenue, &taxes, YEAR);

        let ids: Vec<&str> = tree.children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["tax_ipi", "revenue_taxes.ICMS.sale", "revenue_taxes.ICMS.return"]);
        assert_eq!(tree.children[0].values.get(m(1)), 25.0);
        assert_eq!(tree.children[0].sign, Sign::Minus);
        assert_eq!(tree.root.values.get(m(1)), 90.0);

        let ret = &tree.children[2];
        assert_eq!(ret.label, "ICMS return");
        assert_eq!(ret.sign, Sign::Minus);
        assert_eq!(ret.parent_id.as_deref(), Some("revenue_taxes"));
        assert_eq!(
            ret.drilldown(),
            Some(&CellTarget::Tax {
                tax: TaxName::Icms,
                scenario: TaxScenario::Return
            })
        );
    }

    #[test]
    fn test_expense_tree_skips_duplicates_and_income_taxes() {
        let rows = vec![
            ledger("2.10 + Desconsiderados", "PIS", 1, 10.0),
            ledger("2.10 + Desconsiderados", "ICMS ST", 1, 10.0),
            ledger("2.10 + Desconsiderados", "Transferências", 1, 4.0),
            ledger("2.02 + Tributárias", "CSLL a recolher", 1, 99.0),
            ledger("2.02 + Tributárias", "Taxas", 1, 3.0),
            ledger("", "Orphan", 1, 1.0),
            ledger("2.07 + Operacionais", "Fretes", 1, 7.0),
            ledger("2.07 + Operacionais", "Fretes", 2, 8.0),
        ];
        let tree = build_expense_tree(&rows, YEAR);
        let labels: Vec<&str> = tree.groups.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["2.10 + Desconsiderados", "2.02 + Tributárias", "2.07 + Operacionais"]
        );
        assert_eq!(tree.groups[0].values.get(m(1)), 4.0);
        assert_eq!(tree.groups[1].values.get(m(1)), 3.0);
        assert_eq!(tree.categories.len(), 3);
        assert_eq!(tree.categories[2].values.total(), 15.0);
        assert_eq!(tree.categories[2].parent_id.as_deref(), Some("expense.2.07 + Operacionais"));
    }

    #[test]
    fn test_intermediate_chain_and_order() {
        let mut inputs = inputs(vec![row("", 1, 1000.0)], vec![], vec![]);
        inputs.cogs = [
            (SalesLine::Cogs, vec![row("", 1, 300.0)]),
            (SalesLine::CogsBonus, vec![row("", 1, 20.0)]),
            (SalesLine::CogsLoss, vec![row("", 1, 10.0)]),
            (SalesLine::CogsReturn, vec![row("", 1, 30.0)]),
        ]
        .into_iter()
        .collect();
        inputs.expenses = vec![
            ledger("2.07 + Operacionais", "Fretes", 1, 100.0),
            ledger("2.03 + Despesas com Pessoal", "Salários", 1, 50.0),
            ledger("2.99 + Outros", "Diversos", 1, 5.0),
            ledger("2.06 + Financeiras", "Tarifas", 1, 8.0),
            ledger("2.02 + Tributárias", "Taxas", 1, 2.0),
            ledger("2.10 + Desconsiderados", "Transferências", 1, 1000.0),
        ];
        inputs.financial_revenue = vec![FinancialRevenueRow {
            parent_code: "1.02".into(),
            parent_label: "Receitas financeiras".into(),
            code: "1.02.02".into(),
            label: "Rendimentos".into(),
            period: m(1),
            amount: 40.0,
        }];
        inputs.interest_income = vec![row("", 1, 5.0)];
        inputs.tax_expenses = vec![
            ledger("2.02 + Tributárias", "CSLL", 1, 11.0),
            ledger("2.02 + Tributárias", "IRPJ", 1, 22.0),
        ];

        let nodes = build_tree(YEAR, &inputs);
        let value = |id: &str| find(&nodes, id).values.get(m(1));

        assert_eq!(value("operating_income"), 1000.0 - 300.0 - 20.0 - 10.0 + 30.0);
        assert_eq!(value("gross_profit"), 700.0 - 100.0);
        assert_eq!(value("ebitda"), 700.0 - 100.0 - 50.0);
        assert_eq!(value("financial_revenue"), 45.0);
        assert_eq!(value("income_taxes"), 33.0);
        assert_eq!(value("net_profit"), 550.0 - 8.0 - 2.0 + 45.0 - 33.0);
        assert!((value("net_profit_margin") - 552.0 / 1000.0 * 100.0).abs() < 1e-9);

        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let expected_prefix = [
            "gross_revenue",
            "gross_revenue_volumes",
            "returns",
            "returns_volumes",
            "revenue_taxes",
            "revenue_taxes.pct_gross",
            "st_taxes",
            "discount",
            "discount.pct_gross",
            "net_revenue",
            "net_revenue_margin",
            "cogs",
            "cogs.pct_gross",
            "cogs_bonus",
            "cogs_bonus.pct_gross",
            "cogs_loss",
            "cogs_loss.pct_gross",
            "cogs_return",
            "cogs_return.pct_gross",
            "operating_income",
            "operating_income_margin",
            "expense.2.07 + Operacionais",
            "expense.2.07 + Operacionais.pct_gross",
            "gross_profit",
            "gross_profit_margin",
            "expense.2.03 + Despesas com Pessoal",
            "expense.2.03 + Despesas com Pessoal.pct_gross",
            "expense.2.99 + Outros",
            "ebitda",
            "ebitda_margin",
            "expense.2.06 + Financeiras",
            "expense.2.06 + Financeiras.pct_gross",
            "financial_revenue",
            "expense.2.02 + Tributárias",
            "income_taxes",
            "csll_considered",
            "csll_posted",
            "csll_provisioned",
            "irpj_considered",
            "irpj_posted",
            "irpj_provisioned",
            "net_profit",
            "net_profit_margin",
            "expense.2.10 + Desconsiderados",
        ];
        assert_eq!(&ids[..expected_prefix.len()], &expected_prefix[..]);
        assert!(ids[expected_prefix.len()..].iter().all(|id| id.starts_with("expense.")));

        let fr = find(&nodes, "financial_revenue");
        let groups = fr.financial_revenue_groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].label, constants::INTEREST_INCOME_LABEL);
        assert!(groups[1].categories.is_empty());
    }

    #[test]
    fn test_corrections_are_merged_per_target() {
        let corrections = CorrectionSet::from_csv_str(
            "concept,dimension,period,label,amount\n\
             gross_revenue,,2025-01,,100\n\
             revenue_taxes,,2025-01,PIS/bonus,4\n\
             cogs,,2024-01,,999\n",
        )
        .unwrap();
        let inputs = inputs(vec![row("", 1, 500.0)], vec![], vec![]).with_corrections(&corrections, YEAR);
        let nodes = build_tree(YEAR, &inputs);

        assert_eq!(find(&nodes, "gross_revenue").values.get(m(1)), 600.0);
        assert_eq!(find(&nodes, "revenue_taxes.PIS.bonus").values.get(m(1)), 4.0);
        assert_eq!(find(&nodes, "revenue_taxes").values.get(m(1)), 4.0);
        assert_eq!(find(&nodes, "cogs").values.total(), 0.0);
    }
}
