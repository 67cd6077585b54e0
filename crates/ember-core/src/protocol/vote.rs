use super::{MetricsService, Outcome, ProtocolError};
use crate::config::VotePolicy;
use crate::db::ledger::RecordOutcome;
use crate::db::{items, votes};
use crate::identity::Identity;
use crate::model::{ItemId, VoteDirection};
use rusqlite::TransactionBehavior;

impl MetricsService {
    /// Add one vote in `direction`.
    ///
    /// Under [`VotePolicy::OncePerIdentity`] the vote ledger insert and the
    /// increment commit together, so a rejected duplicate never moves a
    /// counter.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotFoundOrExpired`] when the lookup finds no live item
    /// - [`ProtocolError::ExpiredDuringMutation`] when the item expired between
    ///   lookup and increment
    /// - [`ProtocolError::DuplicateVote`] for a repeat under `once_per_identity`
    pub fn vote(
        &self,
        item_id: &ItemId,
        direction: VoteDirection,
        identity: &Identity,
    ) -> Result<Outcome, ProtocolError> {
        let mut conn = self.store.conn()?;
        self.require_live(&conn, item_id)?;

        let at_ms = self.now_ms();
        let updated = match self.config.votes.policy {
            VotePolicy::Unlimited => items::increment_vote(&conn, item_id, direction, at_ms)?,
            VotePolicy::OncePerIdentity => {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if votes::record_vote(&tx, item_id, &identity.token, direction, at_ms)?
                    == RecordOutcome::AlreadyRecorded
                {
                    tracing::debug!(item_id = %item_id, "duplicate vote rejected");
                    return Err(ProtocolError::DuplicateVote(item_id.clone()));
                }
                let updated = items::increment_vote(&tx, item_id, direction, at_ms)?;
                if updated.is_some() {
                    tx.commit()?;
                }
                updated
            }
        };

        let snapshot = updated.ok_or_else(|| {
            tracing::info!(item_id = %item_id, "item expired during vote");
            ProtocolError::ExpiredDuringMutation(item_id.clone())
        })?;
        tracing::debug!(item_id = %item_id, direction = %direction, "vote applied");
        Ok(Outcome { snapshot, at_ms })
    }
}
