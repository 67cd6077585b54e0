use super::{MetricsService, Outcome, ProtocolError};
use crate::db::items;
use crate::model::ItemId;

impl MetricsService {
    /// Add one share. Shares are repeatable and not deduplicated.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotFoundOrExpired`] when the lookup finds no live item
    /// - [`ProtocolError::ExpiredDuringMutation`] when the increment matched
    ///   nothing
    pub fn share(&self, item_id: &ItemId) -> Result<Outcome, ProtocolError> {
        let conn = self.store.conn()?;
        self.require_live(&conn, item_id)?;

        let at_ms = self.now_ms();
        let snapshot = items::increment_share(&conn, item_id, at_ms)?
            .ok_or_else(|| ProtocolError::ExpiredDuringMutation(item_id.clone()))?;
        tracing::debug!(item_id = %item_id, shares = snapshot.counters.share_count, "share counted");
        Ok(Outcome { snapshot, at_ms })
    }
}
