//! Background sweep: physically remove what read paths already ignore.

use super::{StoreError, items, ledger, ratelimit};
use rusqlite::{Connection, TransactionBehavior, params};
use serde::Serialize;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub items_removed: usize,
    pub view_records_removed: usize,
    pub rate_entries_removed: usize,
}

/// Delete expired items (comments cascade), lapsed view records, and rate
/// entries older than `rate_horizon_ms`.
///
/// # Errors
///
/// Returns an error if any delete fails; nothing is committed in that case.
pub fn sweep(
    conn: &mut Connection,
    now_ms: i64,
    rate_horizon_ms: i64,
) -> Result<SweepReport, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let report = SweepReport {
        items_removed: items::delete_expired(&tx, now_ms)?,
        view_records_removed: ledger::purge_expired(&tx, now_ms)?,
        rate_entries_removed: ratelimit::prune_before(&tx, now_ms.saturating_sub(rate_horizon_ms))?,
    };
    tx.execute(
        "UPDATE store_meta SET last_sweep_at_ms = ?1 WHERE id = 1",
        params![now_ms],
    )?;
    tx.commit()?;

    tracing::info!(
        items = report.items_removed,
        view_records = report.view_records_removed,
        rate_entries = report.rate_entries_removed,
        "sweep complete"
    );
    Ok(report)
}

/// Timestamp of the last completed sweep (0 when never swept).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn last_sweep_at(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT last_sweep_at_ms FROM store_meta WHERE id = 1",
        [],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ledger::ViewRecord;
    use crate::db::{comments, migrations};

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn sweep_removes_expired_rows_everywhere() {
        let mut conn = Connection::open_in_memory().expect("open");
        conn.pragma_update(None, "foreign_keys", "ON").expect("fk");
        migrations::migrate(&mut conn).expect("migrate");

        let dead = items::insert_item(&conn, 100, NOW).expect("dead");
        let live = items::insert_item(&conn, 1_000_000, NOW).expect("live");
        comments::insert_comment(
            &conn,
            &comments::NewComment {
                item_id: &dead.item_id,
                content: "gone soon",
                author_label: "a",
                origin_hash: "o",
            },
            NOW,
        )
        .expect("comment");
        ledger::record_once(
            &conn,
            &ViewRecord {
                item_id: &dead.item_id,
                identity_token: "tok",
                origin_hash: "o",
                signature: "",
            },
            50,
            NOW,
        )
        .expect("view record");
        ratelimit::record_attempt(&conn, "o", ratelimit::ACTION_COMMENT, NOW).expect("rate");

        let report = sweep(&mut conn, NOW + 200, 100).expect("sweep");
        assert_eq!(
            report,
            SweepReport {
                items_removed: 1,
                view_records_removed: 1,
                rate_entries_removed: 1,
            }
        );
        assert_eq!(comments::count_for_item(&conn, &dead.item_id).expect("count"), 0);
        assert!(
            items::get_counters(&conn, &live.item_id, NOW + 200)
                .expect("read")
                .is_some()
        );
        assert_eq!(last_sweep_at(&conn).expect("meta"), NOW + 200);
    }
}
