//! Per-consumer view state: breakdown cache, open drill-down, expansion
//!
//! The core is stateless; whatever a consumer keeps between calls lives here.
//! Results carry the ticket they were requested with and are dropped when a
//! newer request for the same slot has started since.

use pnl_model::{CellTarget, Month, MonthValues, NodeKind, PnlNode};
use std::collections::{HashMap, HashSet};

use crate::details::CellDetail;
use crate::error::ErrorBody;
use crate::pivot::{expand_financial_revenue, placeholders};

// =============================================================================
// Breakdown Cache
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum BreakdownState {
    Pending,
    Ready(Vec<PnlNode>),
    Failed(ErrorBody),
}

/// Handle for one in-flight breakdown fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownTicket {
    node_id: String,
    year: i32,
    generation: u64,
}

#[derive(Debug)]
struct CacheEntry {
    generation: u64,
    state: BreakdownState,
}

/// Breakdown rows keyed by (placeholder id, year)
#[derive(Debug, Default)]
pub struct BreakdownCache {
    entries: HashMap<(String, i32), CacheEntry>,
    next_generation: u64,
}

impl BreakdownCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a placeholder pending and hand out the ticket its result must carry
    pub fn begin(&mut self, node_id: &str, year: i32) -> BreakdownTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.insert(
            (node_id.to_string(), year),
            CacheEntry {
                generation,
                state: BreakdownState::Pending,
            },
        );
        BreakdownTicket {
            node_id: node_id.to_string(),
            year,
            generation,
        }
    }

    /// Store a result. Returns false (and stores nothing) for a stale ticket.
    pub fn complete(&mut self, ticket: &BreakdownTicket, result: Result<Vec<PnlNode>, ErrorBody>) -> bool {
        let Some(entry) = self.entries.get_mut(&(ticket.node_id.clone(), ticket.year)) else {
            return false;
        };
        if entry.generation != ticket.generation {
            return false;
        }
        entry.state = match result {
            Ok(nodes) => BreakdownState::Ready(nodes),
            Err(body) => BreakdownState::Failed(body),
        };
        true
    }

    pub fn get(&self, node_id: &str, year: i32) -> Option<&BreakdownState> {
        self.entries
            .get(&(node_id.to_string(), year))
            .map(|entry| &entry.state)
    }

    /// Drop every entry of `year`; in-flight tickets for it become stale
    pub fn invalidate_year(&mut self, year: i32) {
        self.entries.retain(|(_, entry_year), _| *entry_year != year);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Drill-down
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum DetailState {
    Loading,
    Loaded(CellDetail),
    Failed(ErrorBody),
}

#[derive(Debug)]
struct OpenDetail {
    ticket: DetailTicket,
    month: Month,
    target: CellTarget,
    state: DetailState,
}

/// The drill-down currently shown, if any
#[derive(Debug, Default)]
pub struct DetailView {
    open: Option<OpenDetail>,
    next_ticket: u64,
}

impl DetailView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cell, replacing whatever was open
    pub fn open(&mut self, month: Month, target: CellTarget) -> DetailTicket {
        self.next_ticket += 1;
        let ticket = DetailTicket(self.next_ticket);
        self.open = Some(OpenDetail {
            ticket,
            month,
            target,
            state: DetailState::Loading,
        });
        ticket
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    /// Apply a result only if it belongs to the cell still open
    pub fn apply(&mut self, ticket: DetailTicket, result: Result<CellDetail, ErrorBody>) -> bool {
        match &mut self.open {
            Some(open) if open.ticket == ticket => {
                open.state = match result {
                    Ok(detail) => DetailState::Loaded(detail),
                    Err(body) => DetailState::Failed(body),
                };
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> Option<(Month, &CellTarget, &DetailState)> {
        self.open
            .as_ref()
            .map(|open| (open.month, &open.target, &open.state))
    }
}

// =============================================================================
// Tree View
// =============================================================================

/// Row shown while a breakdown is pending
pub fn loading_node(parent: &PnlNode) -> PnlNode {
    PnlNode::new(
        format!("loading.{}", parent.id),
        "Loading...",
        parent.sign,
        NodeKind::Loading,
        MonthValues::zeroed(parent.values.year()),
    )
    .with_parent(parent.id.clone())
}

/// Resolves children of tree nodes by kind
pub struct TreeView<'a> {
    year: i32,
    nodes: &'a [PnlNode],
    cache: &'a BreakdownCache,
}

impl<'a> TreeView<'a> {
    pub fn new(year: i32, nodes: &'a [PnlNode], cache: &'a BreakdownCache) -> Self {
        Self { year, nodes, cache }
    }

    /// Top-level rows in presentation order
    pub fn roots(&self) -> Vec<PnlNode> {
        self.nodes
            .iter()
            .filter(|node| node.parent_id.is_none())
            .cloned()
            .collect()
    }

    pub fn children(&self, node: &PnlNode) -> Vec<PnlNode> {
        match node.kind {
            NodeKind::Breakdown => match self.cache.get(&node.id, self.year) {
                Some(BreakdownState::Ready(rows)) => rows.clone(),
                Some(BreakdownState::Failed(_)) => Vec::new(),
                Some(BreakdownState::Pending) | None => vec![loading_node(node)],
            },
            NodeKind::Group if node.financial_revenue_groups().is_some() => expand_financial_revenue(node)
                .into_iter()
                .filter(|child| child.parent_id.as_deref() == Some(node.id.as_str()))
                .collect(),
            NodeKind::FinancialRevenueSubgroup => self
                .nodes
                .iter()
                .filter(|n| Some(n.id.as_str()) == node.parent_id.as_deref())
                .flat_map(expand_financial_revenue)
                .filter(|child| child.parent_id.as_deref() == Some(node.id.as_str()))
                .collect(),
            _ => {
                let mut children: Vec<PnlNode> = self
                    .nodes
                    .iter()
                    .filter(|n| n.parent_id.as_deref() == Some(node.id.as_str()))
                    .cloned()
                    .collect();
                children.extend(placeholders(node));
                children
            }
        }
    }

    /// Depth-first rows with the ids in `expanded` opened
    pub fn flatten(&self, expanded: &HashSet<String>) -> Vec<(usize, PnlNode)> {
        let mut out = Vec::new();
        for root in self.roots() {
            self.walk(root, 0, expanded, &mut out);
        }
        out
    }

    fn walk(&self, node: PnlNode, depth: usize, expanded: &HashSet<String>, out: &mut Vec<(usize, PnlNode)>) {
        let open = expanded.contains(&node.id);
        let children = if open { self.children(&node) } else { Vec::new() };
        out.push((depth, node));
        for child in children {
            self.walk(child, depth + 1, expanded, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PnlError};
    use pnl_model::{AccountLine, NodeMeta, SalesLine, TaxName, TaxScenario};

    const YEAR: i32 = 2025;

    fn family(id: &str) -> PnlNode {
        PnlNode::new(id, id, pnl_model::Sign::Plus, NodeKind::Family, MonthValues::zeroed(YEAR))
    }

    #[test]
    fn test_stale_breakdown_results_are_discarded() {
        let mut cache = BreakdownCache::new();
        let first = cache.begin("cogs.breakdown.family", YEAR);
        let second = cache.begin("cogs.breakdown.family", YEAR);

        assert!(!cache.complete(&first, Ok(vec![family("old")])));
        assert_eq!(cache.get("cogs.breakdown.family", YEAR), Some(&BreakdownState::Pending));

        assert!(cache.complete(&second, Ok(vec![family("new")])));
        let Some(BreakdownState::Ready(rows)) = cache.get("cogs.breakdown.family", YEAR) else {
            panic!("expected ready rows");
        };
        assert_eq!(rows[0].id, "new");
    }

    #[test]
    fn test_invalidate_year_drops_entries_and_tickets() {
        let mut cache = BreakdownCache::new();
        let ticket = cache.begin("cogs.breakdown.family", YEAR);
        cache.begin("cogs.breakdown.family", YEAR - 1);
        cache.invalidate_year(YEAR);

        assert_eq!(cache.len(), 1);
        assert!(!cache.complete(&ticket, Ok(Vec::new())));
        assert!(cache.get("cogs.breakdown.family", YEAR).is_none());
    }

    #[test]
    fn test_failed_breakdown_keeps_error_body() {
        let mut cache = BreakdownCache::new();
        let ticket = cache.begin("returns.breakdown.product", YEAR);
        let body = PnlError::Upstream(anyhow::anyhow!("timeout")).to_body();
        assert!(cache.complete(&ticket, Err(body)));
        let Some(BreakdownState::Failed(body)) = cache.get("returns.breakdown.product", YEAR) else {
            panic!("expected failure");
        };
        assert_eq!(body.kind, ErrorKind::Upstream);
    }

    #[test]
    fn test_detail_view_ignores_closed_or_replaced_cells() {
        let mut view = DetailView::new();
        let jan = Month::new(YEAR, 1).unwrap();
        let target = CellTarget::Tax {
            tax: TaxName::Pis,
            scenario: TaxScenario::Sale,
        };

        let first = view.open(jan, target.clone());
        let second = view.open(jan, target.clone());
        assert!(!view.apply(first, Ok(CellDetail::Items(Vec::new()))));
        assert!(view.apply(second, Ok(CellDetail::Items(Vec::new()))));
        assert!(matches!(view.current(), Some((_, _, DetailState::Loaded(_)))));

        let third = view.open(jan, target);
        view.close();
        assert!(!view.apply(third, Ok(CellDetail::Items(Vec::new()))));
        assert!(view.current().is_none());
    }

    #[test]
    fn test_tree_view_resolves_children_by_kind() {
        let gross = PnlNode::line(AccountLine::GrossRevenue, MonthValues::zeroed(YEAR)).with_meta(
            NodeMeta::Drilldown {
                target: pnl_model::CellTarget::Line {
                    line: SalesLine::GrossRevenue,
                },
            },
        );
        let nodes = vec![gross.clone()];
        let mut cache = BreakdownCache::new();

        let view = TreeView::new(YEAR, &nodes, &cache);
        let children = view.children(&gross);
        assert_eq!(children.len(), 2);
        let loading = view.children(&children[0]);
        assert_eq!(loading[0].id, "loading.gross_revenue.breakdown.family");
        assert_eq!(loading[0].label, "Loading...");

        let ticket = cache.begin("gross_revenue.breakdown.family", YEAR);
        cache.complete(&ticket, Ok(vec![family("gross_revenue.family.Snacks")]));
        let view = TreeView::new(YEAR, &nodes, &cache);

        let expanded: HashSet<String> = ["gross_revenue", "gross_revenue.breakdown.family"]
            .into_iter()
            .map(String::from)
            .collect();
        let rows: Vec<(usize, String)> = view
            .flatten(&expanded)
            .into_iter()
            .map(|(depth, node)| (depth, node.id))
            .collect();
        assert_eq!(
            rows,
            vec![
                (0, "gross_revenue".to_string()),
                (1, "gross_revenue.breakdown.family".to_string()),
                (2, "gross_revenue.family.Snacks".to_string()),
                (1, "gross_revenue.breakdown.product".to_string()),
            ]
        );
    }
}
