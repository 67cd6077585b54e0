//! Per-identity vote ledger, consulted only under
//! [`VotePolicy::OncePerIdentity`](crate::config::VotePolicy).

use super::ledger::RecordOutcome;
use super::{StoreError, is_constraint_violation};
use crate::model::{ItemId, VoteDirection};
use rusqlite::{Connection, params};

/// Record that `identity_token` voted on `item_id`.
///
/// # Errors
///
/// Returns an error for any failure other than the uniqueness violation.
pub fn record_vote(
    conn: &Connection,
    item_id: &ItemId,
    identity_token: &str,
    direction: VoteDirection,
    now_ms: i64,
) -> Result<RecordOutcome, StoreError> {
    match conn.execute(
        "INSERT INTO vote_ledger (item_id, identity_token, direction, voted_at_ms)
         VALUES (?1, ?2, ?3, ?4)",
        params![item_id.as_str(), identity_token, direction.as_str(), now_ms],
    ) {
        Ok(_) => Ok(RecordOutcome::Recorded),
        Err(err) if is_constraint_violation(&err) => Ok(RecordOutcome::AlreadyRecorded),
        Err(err) => Err(err.into()),
    }
}
