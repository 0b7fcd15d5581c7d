//! Shared contract between the P&L matrix core and its consumers

pub mod accounts;
pub mod error;
pub mod month;
pub mod node;

pub use accounts::{
    AccountLine, BreakdownRequest, CellTarget, Dimension, ExpenseGroup, SalesLine, TaxFamily, TaxName, TaxScenario,
    expense_category_id, expense_group_id,
};
pub use error::ModelError;
pub use month::{Month, MonthValues, months_of, percent_of};
pub use node::{FinancialRevenueCategory, FinancialRevenueGroup, NodeKind, NodeMeta, PnlNode, Sign};
