//! The seam between the engine and the network.

use async_trait::async_trait;
use ember_core::ErrorCode;
use ember_core::api::{CommentResponse, ItemResponse, ShareResponse, ViewResponse, VoteResponse};
use ember_core::model::{ItemId, VoteDirection};
use std::time::Duration;

/// Failure of one transport call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    /// Gateway-level failure (502/503/504) without a definitive error code.
    #[error("server unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// The server answered with a structured error.
    #[error("rejected with HTTP {status}: {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the engine should back off and try again.
    ///
    /// Timeouts, network failures and gateway errors are transient; so is a
    /// structured error whose code says the store was briefly unavailable.
    /// Everything else, including HTTP 500, is definitive.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Unavailable { .. } => true,
            Self::Rejected { code, .. } => code.is_some_and(ErrorCode::is_transient),
            Self::Decode(_) => false,
        }
    }

    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => None,
        }
    }
}

/// Calls the mutation protocols and the authoritative read.
#[async_trait]
pub trait MetricsTransport: Send + Sync + 'static {
    async fn vote(
        &self,
        item_id: &ItemId,
        direction: VoteDirection,
    ) -> Result<VoteResponse, TransportError>;

    async fn view(&self, item_id: &ItemId, hint: Option<&str>) -> Result<ViewResponse, TransportError>;

    async fn share(&self, item_id: &ItemId) -> Result<ShareResponse, TransportError>;

    async fn comment(&self, item_id: &ItemId, content: &str) -> Result<CommentResponse, TransportError>;

    async fn fetch(&self, item_id: &ItemId) -> Result<ItemResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TransportError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Unavailable { status: 502 }.is_transient());

        let busy = TransportError::Rejected {
            status: 503,
            code: Some(ErrorCode::DatabaseConnectionError),
            message: "busy".into(),
            retry_after_secs: None,
        };
        assert!(busy.is_transient());

        let internal = TransportError::Rejected {
            status: 500,
            code: Some(ErrorCode::DatabaseError),
            message: "boom".into(),
            retry_after_secs: None,
        };
        assert!(!internal.is_transient());

        let expired = TransportError::Rejected {
            status: 410,
            code: Some(ErrorCode::ExpiredDuringMutation),
            message: "gone".into(),
            retry_after_secs: None,
        };
        assert!(!expired.is_transient());
        assert_eq!(expired.code(), Some(ErrorCode::ExpiredDuringMutation));
    }
}
