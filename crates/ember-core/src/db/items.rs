//! Item store: authoritative counters and expiry per item.
//!
//! Every mutation is one conditional statement of the shape
//! `UPDATE items SET col = col + 1 WHERE item_id = ? AND expires_at_ms > ?
//! RETURNING ...`. There is no read-modify-write in application code; a
//! `None` result means the row was missing or already expired at commit.
//!
//! Repeating a call repeats the increment. Dedup and rate limiting are the
//! protocol layer's job.

use super::{StoreError, is_constraint_violation};
use crate::model::item::{ItemId, ItemSnapshot, VoteDirection, to_i64, to_u64};
use crate::model::Counters;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

const SNAPSHOT_COLUMNS: &str = "item_id, upvotes, downvotes, comment_count, views, share_count, \
                                created_at_ms, expires_at_ms";

const INSERT_ATTEMPTS: usize = 3;

/// A single counter column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Upvotes,
    Downvotes,
    CommentCount,
    Views,
    ShareCount,
}

impl CounterField {
    const fn column(self) -> &'static str {
        match self {
            Self::Upvotes => "upvotes",
            Self::Downvotes => "downvotes",
            Self::CommentCount => "comment_count",
            Self::Views => "views",
            Self::ShareCount => "share_count",
        }
    }
}

impl From<VoteDirection> for CounterField {
    fn from(direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => Self::Upvotes,
            VoteDirection::Down => Self::Downvotes,
        }
    }
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<ItemSnapshot> {
    let raw_id: String = row.get(0)?;
    let item_id = ItemId::parse(&raw_id)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?;
    Ok(ItemSnapshot {
        item_id,
        counters: Counters {
            upvotes: to_u64(row.get(1)?),
            downvotes: to_u64(row.get(2)?),
            comment_count: to_u64(row.get(3)?),
            views: to_u64(row.get(4)?),
            share_count: to_u64(row.get(5)?),
        },
        created_at_ms: row.get(6)?,
        expires_at_ms: row.get(7)?,
    })
}

/// Create a fresh item with zeroed counters expiring `lifetime_ms` from now.
///
/// Stand-in for the authoring flow, which lives outside this crate.
///
/// # Errors
///
/// Returns an error if the insert fails or id generation keeps colliding.
pub fn insert_item(conn: &Connection, lifetime_ms: i64, now_ms: i64) -> Result<ItemSnapshot, StoreError> {
    let expires_at_ms = now_ms.saturating_add(lifetime_ms.max(1));
    let mut last_err = None;

    for _ in 0..INSERT_ATTEMPTS {
        let item_id = ItemId::generate();
        match conn.execute(
            "INSERT INTO items (item_id, created_at_ms, expires_at_ms) VALUES (?1, ?2, ?3)",
            params![item_id.as_str(), now_ms, expires_at_ms],
        ) {
            Ok(_) => {
                tracing::debug!(item_id = %item_id, expires_at_ms, "created item");
                return Ok(ItemSnapshot {
                    item_id,
                    counters: Counters::default(),
                    created_at_ms: now_ms,
                    expires_at_ms,
                });
            }
            Err(err) if is_constraint_violation(&err) => last_err = Some(err),
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_err
        .unwrap_or(rusqlite::Error::QueryReturnedNoRows)
        .into())
}

/// Current counters of a live item; `None` when missing or expired.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_counters(
    conn: &Connection,
    item_id: &ItemId,
    now_ms: i64,
) -> Result<Option<ItemSnapshot>, StoreError> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM items WHERE item_id = ?1 AND expires_at_ms > ?2"
    );
    Ok(conn
        .query_row(&sql, params![item_id.as_str(), now_ms], snapshot_from_row)
        .optional()?)
}

fn increment(
    conn: &Connection,
    item_id: &ItemId,
    field: CounterField,
    now_ms: i64,
) -> Result<Option<ItemSnapshot>, StoreError> {
    let column = field.column();
    let sql = format!(
        "UPDATE items SET {column} = {column} + 1 \
         WHERE item_id = ?1 AND expires_at_ms > ?2 \
         RETURNING {SNAPSHOT_COLUMNS}"
    );
    Ok(conn
        .query_row(&sql, params![item_id.as_str(), now_ms], snapshot_from_row)
        .optional()?)
}

/// Atomically add one vote in `direction` if the item is still live.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn increment_vote(
    conn: &Connection,
    item_id: &ItemId,
    direction: VoteDirection,
    now_ms: i64,
) -> Result<Option<ItemSnapshot>, StoreError> {
    increment(conn, item_id, direction.into(), now_ms)
}

/// Atomically add one view if the item is still live. Dedup is the caller's
/// responsibility.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn increment_view(
    conn: &Connection,
    item_id: &ItemId,
    now_ms: i64,
) -> Result<Option<ItemSnapshot>, StoreError> {
    increment(conn, item_id, CounterField::Views, now_ms)
}

/// Atomically add one share if the item is still live.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn increment_share(
    conn: &Connection,
    item_id: &ItemId,
    now_ms: i64,
) -> Result<Option<ItemSnapshot>, StoreError> {
    increment(conn, item_id, CounterField::ShareCount, now_ms)
}

/// Set `comment_count` to an externally computed value if the item is live.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn sync_comment_count(
    conn: &Connection,
    item_id: &ItemId,
    actual_count: u64,
    now_ms: i64,
) -> Result<Option<ItemSnapshot>, StoreError> {
    let sql = format!(
        "UPDATE items SET comment_count = ?3 \
         WHERE item_id = ?1 AND expires_at_ms > ?2 \
         RETURNING {SNAPSHOT_COLUMNS}"
    );
    Ok(conn
        .query_row(
            &sql,
            params![item_id.as_str(), now_ms, to_i64(actual_count)],
            snapshot_from_row,
        )
        .optional()?)
}

/// Live items, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_live(conn: &Connection, now_ms: i64, limit: u32) -> Result<Vec<ItemSnapshot>, StoreError> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM items \
         WHERE expires_at_ms > ?1 \
         ORDER BY created_at_ms DESC, item_id ASC \
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![now_ms, limit], snapshot_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Number of live items.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_live(conn: &Connection, now_ms: i64) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM items WHERE expires_at_ms > ?1",
        params![now_ms],
        |row| row.get(0),
    )?;
    Ok(to_u64(count))
}

/// Physically remove expired items. Comments and vote ledger rows cascade.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_expired(conn: &Connection, now_ms: i64) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM items WHERE expires_at_ms <= ?1",
        params![now_ms],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn new_items_start_at_zero() {
        let conn = conn();
        let item = insert_item(&conn, HOUR, NOW).expect("insert");
        assert_eq!(item.counters, Counters::default());
        assert_eq!(item.expires_at_ms, NOW + HOUR);

        let read = get_counters(&conn, &item.item_id, NOW).expect("read");
        assert_eq!(read, Some(item));
    }

    #[test]
    fn increments_touch_only_their_column() {
        let conn = conn();
        let item = insert_item(&conn, HOUR, NOW).expect("insert");
        let id = &item.item_id;

        increment_vote(&conn, id, VoteDirection::Up, NOW).expect("up");
        increment_vote(&conn, id, VoteDirection::Up, NOW).expect("up");
        increment_vote(&conn, id, VoteDirection::Down, NOW).expect("down");
        increment_view(&conn, id, NOW).expect("view");
        let after = increment_share(&conn, id, NOW)
            .expect("share")
            .expect("live item");

        assert_eq!(
            after.counters,
            Counters {
                upvotes: 2,
                downvotes: 1,
                comment_count: 0,
                views: 1,
                share_count: 1,
            }
        );
        assert_eq!(after.counters.net_votes(), 1);
    }

    #[test]
    fn expired_items_are_invisible_and_immutable() {
        let conn = conn();
        let item = insert_item(&conn, HOUR, NOW).expect("insert");
        let at_expiry = item.expires_at_ms;

        assert!(get_counters(&conn, &item.item_id, at_expiry).expect("read").is_none());
        assert!(
            increment_vote(&conn, &item.item_id, VoteDirection::Up, at_expiry)
                .expect("vote")
                .is_none()
        );
        assert!(increment_view(&conn, &item.item_id, at_expiry).expect("view").is_none());
        assert!(
            sync_comment_count(&conn, &item.item_id, 3, at_expiry)
                .expect("sync")
                .is_none()
        );

        let before_expiry = get_counters(&conn, &item.item_id, at_expiry - 1)
            .expect("read")
            .expect("still live");
        assert_eq!(before_expiry.counters, Counters::default());
    }

    #[test]
    fn missing_items_return_none() {
        let conn = conn();
        let ghost = ItemId::parse("it-ghost").expect("id");
        assert!(get_counters(&conn, &ghost, NOW).expect("read").is_none());
        assert!(increment_share(&conn, &ghost, NOW).expect("share").is_none());
    }

    #[test]
    fn sync_sets_absolute_count() {
        let conn = conn();
        let item = insert_item(&conn, HOUR, NOW).expect("insert");
        let synced = sync_comment_count(&conn, &item.item_id, 7, NOW)
            .expect("sync")
            .expect("live");
        assert_eq!(synced.counters.comment_count, 7);
        let synced = sync_comment_count(&conn, &item.item_id, 2, NOW)
            .expect("sync")
            .expect("live");
        assert_eq!(synced.counters.comment_count, 2);
    }

    #[test]
    fn list_live_filters_and_orders() {
        let conn = conn();
        let old = insert_item(&conn, HOUR, NOW).expect("old");
        let new = insert_item(&conn, HOUR, NOW + 10).expect("new");
        let _short = insert_item(&conn, 5, NOW).expect("short");

        let live = list_live(&conn, NOW + 100, 10).expect("list");
        let ids: Vec<_> = live.iter().map(|i| i.item_id.clone()).collect();
        assert_eq!(ids, vec![new.item_id, old.item_id]);
        assert_eq!(count_live(&conn, NOW + 100).expect("count"), 2);
    }

    #[test]
    fn delete_expired_removes_only_dead_rows() {
        let conn = conn();
        let keep = insert_item(&conn, HOUR, NOW).expect("keep");
        insert_item(&conn, 5, NOW).expect("short");
        assert_eq!(delete_expired(&conn, NOW + 5).expect("delete"), 1);
        assert!(get_counters(&conn, &keep.item_id, NOW + 5).expect("read").is_some());
    }
}
