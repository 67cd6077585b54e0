use super::{MetricsService, Outcome, ProtocolError};
use crate::db::items;
use crate::db::ledger::{self, RecordOutcome, ViewRecord};
use crate::identity::Identity;
use crate::model::ItemId;
use rusqlite::TransactionBehavior;

/// Result of a view attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOutcome {
    /// Whether this call counted a new view.
    pub new_view: bool,
    pub outcome: Outcome,
}

impl MetricsService {
    /// Count a view unless this identity already viewed the item within the
    /// retention window.
    ///
    /// A duplicate is a success with `new_view == false`, whether it was
    /// caught by the pre-check or by the ledger's uniqueness constraint.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotFoundOrExpired`] when the lookup finds no live item
    /// - [`ProtocolError::ExpiredDuringMutation`] when the increment matched
    ///   nothing; the ledger record is rolled back with it
    pub fn view(&self, item_id: &ItemId, identity: &Identity) -> Result<ViewOutcome, ProtocolError> {
        let mut conn = self.store.conn()?;
        let current = self.require_live(&conn, item_id)?;

        let at_ms = self.now_ms();
        if ledger::has_recorded(&conn, item_id, &identity.token, at_ms)? {
            return Ok(ViewOutcome {
                new_view: false,
                outcome: Outcome {
                    snapshot: current,
                    at_ms,
                },
            });
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let record = ViewRecord {
            item_id,
            identity_token: &identity.token,
            origin_hash: &identity.origin_hash,
            signature: &identity.signature,
        };
        if ledger::record_once(&tx, &record, self.config.views.retention_ms(), at_ms)?
            == RecordOutcome::AlreadyRecorded
        {
            // Lost the race to a concurrent view from the same identity.
            let snapshot = items::get_counters(&tx, item_id, at_ms)?.unwrap_or(current);
            return Ok(ViewOutcome {
                new_view: false,
                outcome: Outcome { snapshot, at_ms },
            });
        }

        let Some(snapshot) = items::increment_view(&tx, item_id, at_ms)? else {
            tracing::info!(item_id = %item_id, "item expired during view");
            return Err(ProtocolError::ExpiredDuringMutation(item_id.clone()));
        };
        tx.commit()?;

        tracing::debug!(item_id = %item_id, views = snapshot.counters.views, "view counted");
        Ok(ViewOutcome {
            new_view: true,
            outcome: Outcome { snapshot, at_ms },
        })
    }
}
