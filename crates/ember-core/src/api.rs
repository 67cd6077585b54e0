//! JSON wire types shared by the HTTP server and client transport.
//!
//! All field names are camelCase. Request item ids stay plain strings so a
//! malformed id surfaces as a `VALIDATION_ERROR` body instead of a decode
//! failure.

use crate::error::ErrorCode;
use crate::model::comment::time_ago;
use crate::model::{Comment, Counters, ItemId, VoteDirection};
use crate::protocol::{CommentOutcome, Outcome, ViewOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub item_id: String,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub upvotes: u64,
    pub downvotes: u64,
    pub net_votes: i64,
    pub direction: VoteDirection,
    /// Milliseconds until the item expires.
    pub time_remaining: i64,
}

impl VoteResponse {
    #[must_use]
    pub fn new(outcome: &Outcome, direction: VoteDirection) -> Self {
        let counters = outcome.snapshot.counters;
        Self {
            upvotes: counters.upvotes,
            downvotes: counters.downvotes,
            net_votes: counters.net_votes(),
            direction,
            time_remaining: outcome.time_remaining_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRequest {
    pub item_id: String,
    /// Client-declared session hint; only honored when the server trusts it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub new_view: bool,
    pub view_count: u64,
}

impl From<&ViewOutcome> for ViewResponse {
    fn from(view: &ViewOutcome) -> Self {
        Self {
            new_view: view.new_view,
            view_count: view.outcome.snapshot.counters.views,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub item_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub share_count: u64,
}

impl From<&Outcome> for ShareResponse {
    fn from(outcome: &Outcome) -> Self {
        Self {
            share_count: outcome.snapshot.counters.share_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub item_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub comment: Comment,
    pub time_ago: String,
    pub comment_count: u64,
}

impl From<&CommentOutcome> for CommentResponse {
    fn from(created: &CommentOutcome) -> Self {
        Self {
            comment: created.comment.clone(),
            time_ago: time_ago(created.comment.created_at_ms, created.outcome.at_ms),
            comment_count: created.outcome.snapshot.counters.comment_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRemovedResponse {
    pub item_id: ItemId,
    pub comment_count: u64,
}

impl From<&Outcome> for CommentRemovedResponse {
    fn from(outcome: &Outcome) -> Self {
        Self {
            item_id: outcome.snapshot.item_id.clone(),
            comment_count: outcome.snapshot.counters.comment_count,
        }
    }
}

/// Full authoritative counters of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub counters: Counters,
    pub net_votes: i64,
    pub created_at: i64,
    pub expires_at: i64,
    pub time_remaining: i64,
}

impl From<&Outcome> for ItemResponse {
    fn from(outcome: &Outcome) -> Self {
        let snapshot = &outcome.snapshot;
        Self {
            item_id: snapshot.item_id.clone(),
            counters: snapshot.counters,
            net_votes: snapshot.counters.net_votes(),
            created_at: snapshot.created_at_ms,
            expires_at: snapshot.expires_at_ms,
            time_remaining: outcome.time_remaining_ms(),
        }
    }
}

/// Error envelope: `{"error": {"code", "message", "retryAfterSeconds"?}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.as_str().to_string(),
                message: message.into(),
                retry_after_seconds,
            },
        }
    }

    /// The parsed code, when it is one this build knows.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(&self.error.code)
    }
}
