//! Trailing-window rate limiter keyed by hashed origin and action.
//!
//! [`check`] never records anything. The caller records the attempt with
//! [`record_attempt`] inside the transaction of the write it guards, so a
//! rejected or rolled-back write never consumes budget. Run both inside a
//! `BEGIN IMMEDIATE` transaction to make check-and-record atomic.

use super::StoreError;
use rusqlite::{Connection, params};

/// Action name used for comment submissions.
pub const ACTION_COMMENT: &str = "comment";

/// Limit for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window_secs: u64,
    pub max_attempts: u32,
}

impl RatePolicy {
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        crate::config::secs_to_ms(self.window_secs)
    }
}

/// Outcome of [`check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    RateLimited { retry_after_secs: u64 },
}

/// Count attempts for `origin_hash`/`action` within the trailing window and
/// decide whether one more is allowed.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn check(
    conn: &Connection,
    origin_hash: &str,
    action: &str,
    policy: RatePolicy,
    now_ms: i64,
) -> Result<RateDecision, StoreError> {
    let window_start = now_ms.saturating_sub(policy.window_ms());
    let (count, oldest): (i64, Option<i64>) = conn.query_row(
        "SELECT COUNT(*), MIN(attempted_at_ms)
         FROM rate_window
         WHERE origin_hash = ?1 AND action = ?2 AND attempted_at_ms > ?3",
        params![origin_hash, action, window_start],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let count = u32::try_from(count).unwrap_or(u32::MAX);
    if count < policy.max_attempts {
        return Ok(RateDecision::Allowed {
            remaining: policy.max_attempts - count - 1,
        });
    }

    let frees_at = oldest
        .unwrap_or(now_ms)
        .saturating_add(policy.window_ms());
    let wait_ms = u64::try_from(frees_at.saturating_sub(now_ms)).unwrap_or(0);
    Ok(RateDecision::RateLimited {
        retry_after_secs: wait_ms.div_ceil(1_000).max(1),
    })
}

/// Record one attempt.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn record_attempt(
    conn: &Connection,
    origin_hash: &str,
    action: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO rate_window (origin_hash, action, attempted_at_ms) VALUES (?1, ?2, ?3)",
        params![origin_hash, action, now_ms],
    )?;
    Ok(())
}

/// Drop entries older than `horizon_ms`. They can no longer affect any
/// window shorter than the horizon.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn prune_before(conn: &Connection, horizon_ms: i64) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM rate_window WHERE attempted_at_ms <= ?1",
        params![horizon_ms],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    const NOW: i64 = 1_700_000_000_000;
    const POLICY: RatePolicy = RatePolicy {
        window_secs: 300,
        max_attempts: 5,
    };

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn allows_up_to_max_then_limits() {
        let conn = conn();
        for i in 0..5 {
            let decision = check(&conn, "o", ACTION_COMMENT, POLICY, NOW + i).expect("check");
            assert!(matches!(decision, RateDecision::Allowed { .. }), "attempt {i}");
            record_attempt(&conn, "o", ACTION_COMMENT, NOW + i).expect("record");
        }

        let decision = check(&conn, "o", ACTION_COMMENT, POLICY, NOW + 5).expect("check");
        assert_eq!(
            decision,
            RateDecision::RateLimited {
                retry_after_secs: 300
            }
        );
    }

    #[test]
    fn rejection_does_not_consume_budget() {
        let conn = conn();
        for i in 0..5 {
            record_attempt(&conn, "o", ACTION_COMMENT, NOW + i).expect("record");
        }
        for _ in 0..3 {
            check(&conn, "o", ACTION_COMMENT, POLICY, NOW + 10).expect("check");
        }
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM rate_window", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 5);
    }

    #[test]
    fn window_slides_past_old_attempts() {
        let conn = conn();
        for i in 0..5 {
            record_attempt(&conn, "o", ACTION_COMMENT, NOW + i).expect("record");
        }
        let after_window = NOW + 4 + POLICY.window_ms();
        assert!(matches!(
            check(&conn, "o", ACTION_COMMENT, POLICY, after_window).expect("check"),
            RateDecision::Allowed { remaining: 4 }
        ));
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let conn = conn();
        for i in 0..5 {
            record_attempt(&conn, "o", ACTION_COMMENT, NOW + i * 1_000).expect("record");
        }
        let decision =
            check(&conn, "o", ACTION_COMMENT, POLICY, NOW + 299_500).expect("check");
        assert_eq!(decision, RateDecision::RateLimited { retry_after_secs: 1 });
    }

    #[test]
    fn origins_and_actions_are_isolated() {
        let conn = conn();
        for i in 0..5 {
            record_attempt(&conn, "a", ACTION_COMMENT, NOW + i).expect("record");
        }
        assert!(matches!(
            check(&conn, "b", ACTION_COMMENT, POLICY, NOW + 5).expect("check"),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            check(&conn, "a", "report", POLICY, NOW + 5).expect("check"),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn prune_removes_old_rows() {
        let conn = conn();
        record_attempt(&conn, "o", ACTION_COMMENT, NOW).expect("record");
        record_attempt(&conn, "o", ACTION_COMMENT, NOW + 10).expect("record");
        assert_eq!(prune_before(&conn, NOW).expect("prune"), 1);
    }
}
