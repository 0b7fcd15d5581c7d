//! Breakdown pivots and lazily expanded child rows
//!
//! A pivot regroups breakdown rows by label and sums them per month. The
//! resulting family nodes hang under the breakdown placeholder they expand.

use pnl_model::{
    AccountLine, BreakdownRequest, CellTarget, Dimension, MonthValues, NodeKind, NodeMeta, PnlNode, Sign,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::fetchers::AggregateRow;
use crate::labels::{compare_labels, normalize_product_label, normalize_volume_label, slug};

/// Display label of a breakdown row for its dimension
pub fn breakdown_label(dimension: Dimension, raw: &str) -> String {
    match dimension {
        Dimension::Product => normalize_product_label(raw),
        Dimension::VolumeProduct => normalize_volume_label(raw),
        Dimension::Family | Dimension::VolumeFamily => raw.trim().to_string(),
    }
}

/// Sum rows per (normalized) label, sorted alphabetically. Rows with an
/// empty label are dropped.
pub fn group_by_label(rows: &[AggregateRow], dimension: Dimension, year: i32) -> Vec<(String, MonthValues)> {
    let mut groups: HashMap<String, MonthValues> = HashMap::new();
    for row in rows {
        let label = breakdown_label(dimension, &row.label);
        if label.is_empty() {
            continue;
        }
        groups
            .entry(label)
            .or_insert_with(|| MonthValues::zeroed(year))
            .accumulate(row.period, row.amount);
    }

    let mut groups: Vec<(String, MonthValues)> = groups.into_iter().collect();
    groups.sort_by(|a, b| compare_labels(&a.0, &b.0));
    groups
}

/// Unique child id under `prefix`; labels that slug identically get a
/// numeric suffix.
fn unique_id(prefix: &str, label: &str, taken: &mut HashSet<String>) -> String {
    let base = format!("{}.{}", prefix, slug(label));
    let mut id = base.clone();
    let mut n = 2;
    while !taken.insert(id.clone()) {
        id = format!("{}_{}", base, n);
        n += 1;
    }
    id
}

/// Pivot breakdown rows into family nodes under the request's placeholder
pub fn pivot(rows: &[AggregateRow], request: BreakdownRequest, year: i32) -> Vec<PnlNode> {
    let prefix = format!("{}.{}", request.owner_id(), request.axis());
    let parent = request.placeholder_id();
    let sign = request.line().account().sign();
    let mut taken = HashSet::new();

    group_by_label(rows, request.dimension(), year)
        .into_iter()
        .map(|(label, values)| {
            let id = unique_id(&prefix, &label, &mut taken);
            PnlNode::new(id, label, sign, NodeKind::Family, values).with_parent(parent.clone())
        })
        .collect()
}

/// COGS families, each followed by its share of the same family's gross
/// revenue. Families are matched on the exact label.
pub fn pivot_cogs_families(
    cogs_rows: &[AggregateRow],
    revenue_rows: &[AggregateRow],
    request: BreakdownRequest,
    year: i32,
) -> Vec<PnlNode> {
    let revenue: HashMap<String, MonthValues> = group_by_label(revenue_rows, Dimension::Family, year)
        .into_iter()
        .collect();

    let mut out = Vec::new();
    for node in pivot(cogs_rows, request, year) {
        let percent = match revenue.get(&node.label) {
            Some(family_revenue) => node.values.percent_of(family_revenue),
            None => MonthValues::zeroed(year),
        };
        let pct = PnlNode::new(
            format!("{}.pct_gross", node.id),
            "",
            Sign::Plus,
            NodeKind::DetailPercentage,
            percent,
        );
        let pct = match &node.parent_id {
            Some(parent) => pct.with_parent(parent.clone()),
            None => pct,
        };
        out.push(node);
        out.push(pct);
    }
    out
}

/// Breakdowns a node can expand into: amount breakdowns for sales lines,
/// quantity breakdowns for volume parents.
pub fn breakdown_requests(node: &PnlNode) -> Vec<BreakdownRequest> {
    let Ok(account) = AccountLine::from_str(&node.id) else {
        return Vec::new();
    };
    let Some(line) = account.sales_line() else {
        return Vec::new();
    };
    let dimensions: [Dimension; 2] = if node.kind == NodeKind::VolumeParent {
        [Dimension::VolumeFamily, Dimension::VolumeProduct]
    } else {
        [Dimension::Family, Dimension::Product]
    };
    dimensions
        .into_iter()
        .filter_map(|dimension| BreakdownRequest::new(line, dimension).ok())
        .collect()
}

/// "Family" and "Product" placeholder rows under a sales line or volume parent
pub fn placeholders(node: &PnlNode) -> Vec<PnlNode> {
    breakdown_requests(node)
        .into_iter()
        .map(|request| {
            PnlNode::new(
                request.placeholder_id(),
                request.dimension().label(),
                node.sign,
                NodeKind::Breakdown,
                MonthValues::zeroed(node.values.year()),
            )
            .with_parent(node.id.clone())
            .with_meta(NodeMeta::Breakdown { request })
        })
        .collect()
}

/// Subgroup rows for the financial revenue line, each followed by its
/// category rows.
pub fn expand_financial_revenue(node: &PnlNode) -> Vec<PnlNode> {
    let Some(groups) = node.financial_revenue_groups() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut taken = HashSet::new();
    for group in groups {
        let group_id = unique_id(&node.id, &group.label, &mut taken);
        out.push(
            PnlNode::new(
                group_id.clone(),
                group.label.clone(),
                node.sign,
                NodeKind::FinancialRevenueSubgroup,
                group.values,
            )
            .with_parent(node.id.clone()),
        );

        let mut category_ids = HashSet::new();
        for category in &group.categories {
            out.push(
                PnlNode::new(
                    unique_id(&group_id, &category.label, &mut category_ids),
                    category.label.clone(),
                    node.sign,
                    NodeKind::Family,
                    category.values,
                )
                .with_parent(group_id.clone())
                .with_meta(NodeMeta::Drilldown {
                    target: CellTarget::FinancialRevenue {
                        parent: group.label.clone(),
                        category: category.label.clone(),
                    },
                }),
            );
        }
    }
    out
}
