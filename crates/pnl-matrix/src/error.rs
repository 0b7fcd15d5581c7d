//! Error taxonomy surfaced to callers of the P&L entry points

use pnl_model::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the service entry points.
///
/// Store clients work in `anyhow`; anything they raise arrives here as
/// [`PnlError::Upstream`]. The three variants are never merged so a caller can
/// tell a parameter problem from a retryable failure.
#[derive(Debug, Error)]
pub enum PnlError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported combination: {0}")]
    Unsupported(String),

    #[error("upstream failure: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PnlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unsupported,
    Upstream,
}

/// Serializable error object returned instead of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
}

impl PnlError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        PnlError::BadRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PnlError::BadRequest(_) => ErrorKind::BadRequest,
            PnlError::Unsupported(_) => ErrorKind::Unsupported,
            PnlError::Upstream(_) => ErrorKind::Upstream,
        }
    }

    /// HTTP-equivalent status code
    pub fn status(&self) -> u16 {
        match self {
            PnlError::BadRequest(_) => 400,
            PnlError::Unsupported(_) => 422,
            PnlError::Upstream(_) => 502,
        }
    }

    /// Upstream details stay in the logs; the body only says the source failed
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            PnlError::BadRequest(message) | PnlError::Unsupported(message) => message.clone(),
            PnlError::Upstream(_) => "a backing data source failed; retry the request".to_string(),
        };
        ErrorBody {
            status: self.status(),
            kind: self.kind(),
            message,
        }
    }
}

impl From<ModelError> for PnlError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::UnsupportedBreakdown { .. } => PnlError::Unsupported(err.to_string()),
            ModelError::InvalidMonth(_) | ModelError::UnknownIdentifier { .. } => PnlError::BadRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnl_model::{Dimension, SalesLine};

    #[test]
    fn test_status_per_kind() {
        assert_eq!(PnlError::bad_request("year").status(), 400);
        assert_eq!(PnlError::Unsupported("x".into()).status(), 422);
        assert_eq!(PnlError::Upstream(anyhow::anyhow!("timeout")).status(), 502);
    }

    #[test]
    fn test_model_errors_keep_their_kind() {
        let unsupported: PnlError = ModelError::UnsupportedBreakdown {
            line: SalesLine::Discount,
            dimension: Dimension::VolumeFamily,
        }
        .into();
        assert_eq!(unsupported.kind(), ErrorKind::Unsupported);

        let bad: PnlError = ModelError::InvalidMonth("2025-13".into()).into();
        assert_eq!(bad.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_upstream_body_hides_details() {
        let err = PnlError::Upstream(anyhow::anyhow!("password=hunter2 rejected"));
        let body = err.to_body();
        assert_eq!(body.kind, ErrorKind::Upstream);
        assert!(!body.message.contains("hunter2"));
    }
}
