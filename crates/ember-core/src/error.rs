use std::fmt;

/// Machine-readable error codes surfaced to API callers and client engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFoundOrExpired,
    ExpiredDuringMutation,
    InvalidVoteType,
    ValidationError,
    DuplicateVote,
    RateLimitExceeded,
    DatabaseConnectionError,
    DatabaseError,
    NotFound,
    InternalError,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::NotFoundOrExpired,
        Self::ExpiredDuringMutation,
        Self::InvalidVoteType,
        Self::ValidationError,
        Self::DuplicateVote,
        Self::RateLimitExceeded,
        Self::DatabaseConnectionError,
        Self::DatabaseError,
        Self::NotFound,
        Self::InternalError,
    ];

    /// Stable code identifier for machine parsing.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFoundOrExpired => "NOT_FOUND_OR_EXPIRED",
            Self::ExpiredDuringMutation => "EXPIRED_DURING_MUTATION",
            Self::InvalidVoteType => "INVALID_VOTE_TYPE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::DuplicateVote => "DUPLICATE_VOTE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::DatabaseConnectionError => "DATABASE_CONNECTION_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Parse a stable code string back into an [`ErrorCode`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Short human-facing summary for logs and responses.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotFoundOrExpired => "Item not found or expired",
            Self::ExpiredDuringMutation => "Item expired while the update was being applied",
            Self::InvalidVoteType => "Vote direction must be 'up' or 'down'",
            Self::ValidationError => "Request failed validation",
            Self::DuplicateVote => "This identity has already voted on the item",
            Self::RateLimitExceeded => "Too many attempts, slow down",
            Self::DatabaseConnectionError => "Counter store temporarily unavailable",
            Self::DatabaseError => "Counter store error",
            Self::NotFound => "No such route",
            Self::InternalError => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and clients.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotFoundOrExpired | Self::ExpiredDuringMutation => {
                Some("Items are ephemeral; refresh the listing to drop expired posts.")
            }
            Self::RateLimitExceeded => Some("Wait for retryAfterSeconds before submitting again."),
            Self::DatabaseConnectionError => Some("Retry with backoff; the store is busy or restarting."),
            Self::DatabaseError | Self::InternalError => {
                Some("Retry once. If persistent, report a bug with logs.")
            }
            Self::InvalidVoteType
            | Self::ValidationError
            | Self::DuplicateVote
            | Self::NotFound => None,
        }
    }

    /// HTTP status the server maps this code to.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidVoteType | Self::ValidationError => 400,
            Self::NotFoundOrExpired | Self::NotFound => 404,
            Self::DuplicateVote => 409,
            Self::ExpiredDuringMutation => 410,
            Self::RateLimitExceeded => 429,
            Self::DatabaseConnectionError => 503,
            Self::DatabaseError | Self::InternalError => 500,
        }
    }

    /// Whether a client may retry the same request unchanged.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::DatabaseConnectionError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
