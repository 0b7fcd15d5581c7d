//! Monthly P&L matrix
//!
//! Builds a year of profit and loss lines from the invoice warehouse and the
//! expense ledger, with on-demand breakdowns and cell drill-downs.

pub mod bigquery;
pub mod builder;
pub mod config;
pub mod constants;
pub mod details;
pub mod error;
pub mod fetchers;
pub mod fixtures;
pub mod labels;
pub mod ledger;
pub mod numeric;
pub mod overlay;
pub mod pivot;
pub mod provision;
pub mod render;
pub mod request;
pub mod server;
pub mod service;
pub mod session;
pub mod warehouse;

pub use error::{ErrorBody, ErrorKind, PnlError};
pub use service::PnlService;
