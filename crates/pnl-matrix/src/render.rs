//! Console output for the CLI

use pnl_model::{NodeKind, PnlNode, months_of};

use crate::details::CellDetail;

const LABEL_WIDTH: usize = 44;
const VALUE_WIDTH: usize = 12;

/// Amounts with two decimals, ratios as percentages
pub fn format_value(kind: NodeKind, value: f64) -> String {
    if kind.is_ratio() {
        format!("{:.1}%", value)
    } else {
        format!("{:.2}", value)
    }
}

fn display_label(node: &PnlNode) -> String {
    match node.kind {
        NodeKind::DetailPercentage => "% of gross revenue".to_string(),
        _ => node.label.clone(),
    }
}

fn header(year: i32) -> String {
    let mut line = format!("{:<width$}", "", width = LABEL_WIDTH);
    for month in months_of(year) {
        line.push_str(&format!(" {:>width$}", month.to_string(), width = VALUE_WIDTH));
    }
    line.push_str(&format!(" {:>width$}", "Total", width = VALUE_WIDTH));
    line
}

/// One line per row: indented label, twelve months, year total. Ratio rows
/// have no total.
pub fn render_rows(year: i32, rows: &[(usize, PnlNode)]) -> Vec<String> {
    let mut lines = vec![header(year)];
    lines.push("-".repeat(LABEL_WIDTH + (VALUE_WIDTH + 1) * 13));

    for (depth, node) in rows {
        let label = format!("{}{}", "  ".repeat(*depth), display_label(node));
        let label: String = label.chars().take(LABEL_WIDTH).collect();
        let mut line = format!("{:<width$}", label, width = LABEL_WIDTH);

        if node.kind == NodeKind::Loading || node.kind == NodeKind::Breakdown {
            lines.push(line.trim_end().to_string());
            continue;
        }
        for (_, value) in node.values.iter() {
            line.push_str(&format!(" {:>width$}", format_value(node.kind, value), width = VALUE_WIDTH));
        }
        let total = if node.kind.is_ratio() {
            String::new()
        } else {
            format_value(node.kind, node.values.total())
        };
        line.push_str(&format!(" {:>width$}", total, width = VALUE_WIDTH));
        lines.push(line.trim_end().to_string());
    }
    lines
}

pub fn print_rows(year: i32, rows: &[(usize, PnlNode)]) {
    for line in render_rows(year, rows) {
        println!("{}", line);
    }
}

pub fn render_detail(detail: &CellDetail) -> Vec<String> {
    let mut lines = Vec::new();
    match detail {
        CellDetail::Items(rows) => {
            lines.push(format!("{:<50} {:>8} {:>14}", "Item", "Lines", "Total"));
            lines.push("-".repeat(74));
            for row in rows {
                lines.push(format!("{:<50} {:>8} {:>14.2}", row.label, row.line_count, row.total));
            }
        }
        CellDetail::Expenses(rows) => {
            lines.push(format!("{:<12} {:<30} {:<12} {:>14}  {}", "Date", "Supplier", "Status", "Amount", "Note"));
            lines.push("-".repeat(90));
            for row in rows {
                lines.push(format!(
                    "{:<12} {:<30} {:<12} {:>14.2}  {}",
                    row.entry_date,
                    row.supplier.as_deref().unwrap_or("-"),
                    row.status,
                    row.amount,
                    row.note.as_deref().unwrap_or(""),
                ));
            }
        }
        CellDetail::FinancialRevenue(rows) => {
            lines.push(format!("{:<12} {:<12} {:>14}  {}", "Entry", "Date", "Amount", "Note"));
            lines.push("-".repeat(60));
            for row in rows {
                lines.push(format!(
                    "{:<12} {:<12} {:>14.2}  {}",
                    row.entry_id,
                    row.posted_on,
                    row.amount,
                    row.note.as_deref().unwrap_or(""),
                ));
            }
        }
    }
    lines.push(format!("\n{} row(s)", detail.len()));
    lines
}

pub fn print_detail(detail: &CellDetail) {
    for line in render_detail(detail) {
        println!("{}", line);
    }
}
