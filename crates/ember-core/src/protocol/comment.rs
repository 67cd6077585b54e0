//! Comment creation and removal, and the comment-count sync that keeps
//! `items.comment_count` equal to the number of comment rows.

use super::{MetricsService, Outcome, ProtocolError};
use crate::db::comments::{self, NewComment};
use crate::db::ratelimit::{self, ACTION_COMMENT, RateDecision, RatePolicy};
use crate::db::items;
use crate::identity::Identity;
use crate::model::comment::validate_content;
use crate::model::{Comment, ItemId};
use rusqlite::{Connection, TransactionBehavior};

/// A stored comment plus the item's counters after the sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentOutcome {
    pub comment: Comment,
    pub outcome: Outcome,
}

impl MetricsService {
    fn comment_policy(&self) -> RatePolicy {
        RatePolicy {
            window_secs: self.config.comments.window_secs,
            max_attempts: self.config.comments.max_per_window,
        }
    }

    /// Validate, rate-limit and store a comment, then sync the item's count.
    ///
    /// The rate check, the comment insert, the rate-window entry and the count
    /// sync share one immediate transaction, so concurrent submissions from
    /// one origin cannot overshoot the limit and a rejected submission uses
    /// no budget.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Validation`] for empty, oversized or malformed content
    /// - [`ProtocolError::NotFoundOrExpired`] when the item is gone
    /// - [`ProtocolError::RateLimited`] when the origin exhausted its window
    pub fn create_comment(
        &self,
        item_id: &ItemId,
        raw_content: &str,
        identity: &Identity,
    ) -> Result<CommentOutcome, ProtocolError> {
        let content = validate_content(raw_content, self.config.comments.max_length)
            .map_err(ProtocolError::Validation)?;

        let mut conn = self.store.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let at_ms = self.now_ms();
        if items::get_counters(&tx, item_id, at_ms)?.is_none() {
            return Err(ProtocolError::NotFoundOrExpired(item_id.clone()));
        }

        let decision = ratelimit::check(
            &tx,
            &identity.origin_hash,
            ACTION_COMMENT,
            self.comment_policy(),
            at_ms,
        )?;
        if let RateDecision::RateLimited { retry_after_secs } = decision {
            tracing::info!(item_id = %item_id, retry_after_secs, "comment rate limited");
            return Err(ProtocolError::RateLimited { retry_after_secs });
        }

        let comment = comments::insert_comment(
            &tx,
            &NewComment {
                item_id,
                content: &content,
                author_label: &identity.label,
                origin_hash: &identity.origin_hash,
            },
            at_ms,
        )?;
        ratelimit::record_attempt(&tx, &identity.origin_hash, ACTION_COMMENT, at_ms)?;
        let snapshot = resync(&tx, item_id, at_ms)?;
        tx.commit()?;

        tracing::debug!(
            item_id = %item_id,
            comment_id = comment.comment_id,
            comments = snapshot.counters.comment_count,
            "comment stored"
        );
        Ok(CommentOutcome {
            comment,
            outcome: Outcome { snapshot, at_ms },
        })
    }

    /// Delete a comment and re-sync its item's count.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CommentNotFound`] for an unknown comment id
    /// - [`ProtocolError::NotFoundOrExpired`] when the parent item has expired;
    ///   the delete is rolled back
    pub fn remove_comment(&self, comment_id: i64) -> Result<Outcome, ProtocolError> {
        let mut conn = self.store.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let at_ms = self.now_ms();

        let item_id = comments::delete_comment(&tx, comment_id)?
            .ok_or(ProtocolError::CommentNotFound(comment_id))?;
        let snapshot = match resync(&tx, &item_id, at_ms) {
            Err(ProtocolError::ExpiredDuringMutation(id)) => {
                return Err(ProtocolError::NotFoundOrExpired(id));
            }
            other => other?,
        };
        tx.commit()?;

        tracing::debug!(item_id = %item_id, comment_id, "comment removed");
        Ok(Outcome { snapshot, at_ms })
    }

    /// Recount an item's comments and store the result.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::NotFoundOrExpired`] when the lookup finds no live item
    /// - [`ProtocolError::ExpiredDuringMutation`] when the sync matched nothing
    pub fn sync_comment_count(&self, item_id: &ItemId) -> Result<Outcome, ProtocolError> {
        let mut conn = self.store.conn()?;
        self.require_live(&conn, item_id)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let at_ms = self.now_ms();
        let snapshot = resync(&tx, item_id, at_ms)?;
        tx.commit()?;
        Ok(Outcome { snapshot, at_ms })
    }
}

fn resync(
    conn: &Connection,
    item_id: &ItemId,
    at_ms: i64,
) -> Result<crate::model::ItemSnapshot, ProtocolError> {
    let actual = comments::count_for_item(conn, item_id)?;
    items::sync_comment_count(conn, item_id, actual, at_ms)?
        .ok_or_else(|| ProtocolError::ExpiredDuringMutation(item_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Harness, NOW};
    use crate::clock::ManualClock;
    use crate::config::EmberConfig;
    use crate::error::ErrorCode;

    #[test]
    fn create_stores_comment_and_syncs_count() {
        let harness = Harness::new();
        let item = harness.item();
        let author = harness.identity("10.0.0.1");

        let created = harness
            .service
            .create_comment(&item, "  nice post  ", &author)
            .expect("comment");
        assert_eq!(created.comment.content, "nice post");
        assert_eq!(created.comment.author, author.label);
        assert_eq!(created.outcome.snapshot.counters.comment_count, 1);
    }

    #[test]
    fn invalid_content_is_rejected_before_touching_storage() {
        let harness = Harness::new();
        let ghost = crate::model::ItemId::parse("it-ghost").expect("id");
        let err = harness
            .service
            .create_comment(&ghost, "   ", &harness.identity("o"))
            .expect_err("empty");
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let long = "x".repeat(501);
        let err = harness
            .service
            .create_comment(&ghost, &long, &harness.identity("o"))
            .expect_err("too long");
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn sixth_comment_in_window_is_rate_limited() {
        let harness = Harness::new();
        let item = harness.item();
        let author = harness.identity("10.0.0.1");

        for n in 0..5 {
            harness
                .service
                .create_comment(&item, &format!("comment {n}"), &author)
                .expect("within limit");
            harness.clock.advance(1_000);
        }

        let err = harness
            .service
            .create_comment(&item, "one too many", &author)
            .expect_err("limited");
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
        // Oldest attempt at NOW frees at NOW+300s; clock is at NOW+5s.
        assert_eq!(err.retry_after_secs(), Some(295));

        let counters = harness.service.counters(&item).expect("read").snapshot.counters;
        assert_eq!(counters.comment_count, 5);

        harness
            .service
            .create_comment(&item, "different origin", &harness.identity("10.0.0.2"))
            .expect("other origin unaffected");
    }

    #[test]
    fn rejected_comments_do_not_consume_budget() {
        let mut config = EmberConfig::default();
        config.comments.max_per_window = 1;
        let harness = Harness::with(config, ManualClock::new(NOW));
        let item = harness.item();
        let author = harness.identity("10.0.0.1");

        harness.service.create_comment(&item, "first", &author).expect("first");
        for _ in 0..3 {
            harness
                .service
                .create_comment(&item, "again", &author)
                .expect_err("limited");
        }
        harness.clock.advance(300_000);
        harness
            .service
            .create_comment(&item, "after window", &author)
            .expect("window slid past the only recorded attempt");
    }

    #[test]
    fn remove_resyncs_count() {
        let harness = Harness::new();
        let item = harness.item();
        let author = harness.identity("10.0.0.1");
        let first = harness
            .service
            .create_comment(&item, "first", &author)
            .expect("first");
        harness
            .service
            .create_comment(&item, "second", &author)
            .expect("second");

        let after = harness
            .service
            .remove_comment(first.comment.comment_id)
            .expect("remove");
        assert_eq!(after.snapshot.counters.comment_count, 1);

        let err = harness
            .service
            .remove_comment(first.comment.comment_id)
            .expect_err("already gone");
        assert_eq!(err.code(), ErrorCode::NotFound);

        let synced = harness.service.sync_comment_count(&item).expect("sync");
        assert_eq!(synced.snapshot.counters.comment_count, 1);
    }
}
