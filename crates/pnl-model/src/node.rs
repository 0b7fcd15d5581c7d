//! The universal tree node and its kind/meta tags

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::accounts::{AccountLine, BreakdownRequest, CellTarget};
use crate::month::MonthValues;

/// Whether a line is a deduction in its parent's aggregation. Informational
/// only: computed lines add and subtract explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Plus => write!(f, "+"),
            Sign::Minus => write!(f, "-"),
        }
    }
}

/// How a consumer should format and expand a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Plain,
    Intermediate,
    /// Ratio x100 of two computed lines
    Percentage,
    Family,
    Loading,
    /// Ratio x100 of the line above it over gross revenue
    DetailPercentage,
    VolumeParent,
    Group,
    FinancialRevenueSubgroup,
    /// Placeholder that expands into an on-demand breakdown
    Breakdown,
}

impl NodeKind {
    pub fn is_ratio(self) -> bool {
        matches!(self, NodeKind::Percentage | NodeKind::DetailPercentage)
    }
}

/// Auxiliary payload attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeMeta {
    /// Per-parent-category totals behind the financial revenue line
    FinancialRevenue { groups: Vec<FinancialRevenueGroup> },
    /// The cell itemization a (row, month) click resolves to
    Drilldown { target: CellTarget },
    /// The breakdown a placeholder row expands into
    Breakdown { request: BreakdownRequest },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRevenueGroup {
    pub label: String,
    pub values: MonthValues,
    pub categories: Vec<FinancialRevenueCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRevenueCategory {
    pub label: String,
    pub values: MonthValues,
}

/// One row of the P&L matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub label: String,
    pub sign: Sign,
    pub values: MonthValues,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
}

impl PnlNode {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        sign: Sign,
        kind: NodeKind,
        values: MonthValues,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            label: label.into(),
            sign,
            values,
            kind,
            meta: None,
        }
    }

    /// Node for a fixed account line, using its id, label, sign and kind
    pub fn line(line: AccountLine, values: MonthValues) -> Self {
        Self::new(line.id(), line.label(), line.sign(), line.kind(), values)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn drilldown(&self) -> Option<&CellTarget> {
        match &self.meta {
            Some(NodeMeta::Drilldown { target }) => Some(target),
            _ => None,
        }
    }

    pub fn breakdown(&self) -> Option<BreakdownRequest> {
        match &self.meta {
            Some(NodeMeta::Breakdown { request }) => Some(*request),
            _ => None,
        }
    }

    pub fn financial_revenue_groups(&self) -> Option<&[FinancialRevenueGroup]> {
        match &self.meta {
            Some(NodeMeta::FinancialRevenue { groups }) => Some(groups),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::SalesLine;

    #[test]
    fn test_node_json_shape() {
        let node = PnlNode::line(AccountLine::Returns, MonthValues::zeroed(2025)).with_meta(NodeMeta::Drilldown {
            target: CellTarget::Line {
                line: SalesLine::Returns,
            },
        });

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], "returns");
        assert_eq!(json["sign"], "-");
        assert_eq!(json["kind"], "plain");
        assert!(json.get("parentId").is_none());
        assert_eq!(json["meta"]["type"], "drilldown");
        assert_eq!(json["meta"]["target"]["line"], "returns");
        assert_eq!(json["values"].as_object().unwrap().len(), 12);

        let back: PnlNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_ratio_kinds() {
        assert!(NodeKind::Percentage.is_ratio());
        assert!(NodeKind::DetailPercentage.is_ratio());
        assert!(!NodeKind::Intermediate.is_ratio());
    }
}
