//! Parse and validation errors for the shared model types

use thiserror::Error;

use crate::accounts::{Dimension, SalesLine};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("unknown {kind} '{value}'")]
    UnknownIdentifier { kind: &'static str, value: String },

    #[error("{dimension} breakdown is not available for {line}")]
    UnsupportedBreakdown { line: SalesLine, dimension: Dimension },
}

impl ModelError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        ModelError::UnknownIdentifier {
            kind,
            value: value.to_string(),
        }
    }
}
