//! Dedup ledger: at most one counted view per (item, identity).
//!
//! `has_recorded` is a cheap pre-check. The authoritative answer comes from
//! the `(item_id, identity_token)` primary key: a constraint violation on
//! insert means another request won the race, and maps to
//! [`RecordOutcome::AlreadyRecorded`] rather than an error.
//!
//! Records expire after the retention window independently of the item. An
//! expired record is reclaimed in place by the next `record_once` for the
//! same pair, or removed by the sweep.

use super::{StoreError, is_constraint_violation};
use crate::model::ItemId;
use rusqlite::{Connection, params};

/// Result of [`record_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    AlreadyRecorded,
}

/// One ledger insert.
#[derive(Debug, Clone, Copy)]
pub struct ViewRecord<'a> {
    pub item_id: &'a ItemId,
    pub identity_token: &'a str,
    pub origin_hash: &'a str,
    pub signature: &'a str,
}

/// Whether a live record exists for the pair.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_recorded(
    conn: &Connection,
    item_id: &ItemId,
    identity_token: &str,
    now_ms: i64,
) -> Result<bool, StoreError> {
    Ok(conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM view_ledger
            WHERE item_id = ?1 AND identity_token = ?2 AND expires_at_ms > ?3
        )",
        params![item_id.as_str(), identity_token, now_ms],
        |row| row.get(0),
    )?)
}

/// Insert the record unless a live one already exists.
///
/// Run inside the same transaction as the view increment so a rolled-back
/// increment does not leave a record behind.
///
/// # Errors
///
/// Returns an error for any failure other than the uniqueness violation.
pub fn record_once(
    conn: &Connection,
    record: &ViewRecord<'_>,
    retention_ms: i64,
    now_ms: i64,
) -> Result<RecordOutcome, StoreError> {
    // Reclaim a lapsed record for this exact pair so the insert can proceed.
    conn.execute(
        "DELETE FROM view_ledger
         WHERE item_id = ?1 AND identity_token = ?2 AND expires_at_ms <= ?3",
        params![record.item_id.as_str(), record.identity_token, now_ms],
    )?;

    let inserted = conn.execute(
        "INSERT INTO view_ledger (
            item_id,
            identity_token,
            origin_hash,
            signature,
            recorded_at_ms,
            expires_at_ms
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.item_id.as_str(),
            record.identity_token,
            record.origin_hash,
            record.signature,
            now_ms,
            now_ms.saturating_add(retention_ms),
        ],
    );

    match inserted {
        Ok(_) => Ok(RecordOutcome::Recorded),
        Err(err) if is_constraint_violation(&err) => {
            tracing::debug!(item_id = %record.item_id, "view already recorded for identity");
            Ok(RecordOutcome::AlreadyRecorded)
        }
        Err(err) => Err(err.into()),
    }
}

/// Number of records (live or lapsed) for an item.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_for_item(conn: &Connection, item_id: &ItemId) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM view_ledger WHERE item_id = ?1",
        params![item_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Remove records whose retention has elapsed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn purge_expired(conn: &Connection, now_ms: i64) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM view_ledger WHERE expires_at_ms <= ?1",
        params![now_ms],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    const NOW: i64 = 1_700_000_000_000;
    const RETENTION: i64 = 30 * 86_400_000;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    fn record<'a>(item_id: &'a ItemId, token: &'a str) -> ViewRecord<'a> {
        ViewRecord {
            item_id,
            identity_token: token,
            origin_hash: "origin",
            signature: "ua",
        }
    }

    #[test]
    fn second_insert_is_already_recorded() {
        let conn = conn();
        let item = ItemId::parse("it-view01").expect("id");

        assert!(!has_recorded(&conn, &item, "tok", NOW).expect("check"));
        assert_eq!(
            record_once(&conn, &record(&item, "tok"), RETENTION, NOW).expect("first"),
            RecordOutcome::Recorded
        );
        assert!(has_recorded(&conn, &item, "tok", NOW).expect("check"));
        assert_eq!(
            record_once(&conn, &record(&item, "tok"), RETENTION, NOW + 1).expect("second"),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(count_for_item(&conn, &item).expect("count"), 1);
    }

    #[test]
    fn distinct_identities_record_independently() {
        let conn = conn();
        let item = ItemId::parse("it-view02").expect("id");
        for token in ["a", "b", "c"] {
            assert_eq!(
                record_once(&conn, &record(&item, token), RETENTION, NOW).expect("insert"),
                RecordOutcome::Recorded
            );
        }
        assert_eq!(count_for_item(&conn, &item).expect("count"), 3);
    }

    #[test]
    fn lapsed_record_is_reclaimed() {
        let conn = conn();
        let item = ItemId::parse("it-view03").expect("id");
        record_once(&conn, &record(&item, "tok"), RETENTION, NOW).expect("first");

        let later = NOW + RETENTION;
        assert!(!has_recorded(&conn, &item, "tok", later).expect("check"));
        assert_eq!(
            record_once(&conn, &record(&item, "tok"), RETENTION, later).expect("again"),
            RecordOutcome::Recorded
        );
        assert_eq!(count_for_item(&conn, &item).expect("count"), 1);
    }

    #[test]
    fn purge_drops_only_lapsed_records() {
        let conn = conn();
        let item = ItemId::parse("it-view04").expect("id");
        record_once(&conn, &record(&item, "old"), RETENTION, NOW).expect("old");
        record_once(&conn, &record(&item, "new"), RETENTION, NOW + 10).expect("new");

        assert_eq!(purge_expired(&conn, NOW + RETENTION).expect("purge"), 1);
        assert!(has_recorded(&conn, &item, "new", NOW + RETENTION).expect("check"));
    }
}
