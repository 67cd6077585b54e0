//! Comment rows. The count stored on `items.comment_count` is derived from
//! this table by the comment-count sync protocol.

use super::StoreError;
use crate::model::{Comment, ItemId};
use crate::model::item::to_u64;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

/// One comment insert.
#[derive(Debug, Clone, Copy)]
pub struct NewComment<'a> {
    pub item_id: &'a ItemId,
    pub content: &'a str,
    pub author_label: &'a str,
    pub origin_hash: &'a str,
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let raw_id: String = row.get(1)?;
    let item_id = ItemId::parse(&raw_id)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(err)))?;
    Ok(Comment {
        comment_id: row.get(0)?,
        item_id,
        content: row.get(2)?,
        author: row.get(3)?,
        created_at_ms: row.get(4)?,
    })
}

/// Insert a comment row.
///
/// # Errors
///
/// Returns an error if the insert fails (including a missing parent item).
pub fn insert_comment(
    conn: &Connection,
    comment: &NewComment<'_>,
    now_ms: i64,
) -> Result<Comment, StoreError> {
    conn.execute(
        "INSERT INTO comments (item_id, content, author_label, origin_hash, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            comment.item_id.as_str(),
            comment.content,
            comment.author_label,
            comment.origin_hash,
            now_ms,
        ],
    )?;

    Ok(Comment {
        comment_id: conn.last_insert_rowid(),
        item_id: comment.item_id.clone(),
        content: comment.content.to_string(),
        author: comment.author_label.to_string(),
        created_at_ms: now_ms,
    })
}

/// Authoritative comment count for an item.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_for_item(conn: &Connection, item_id: &ItemId) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE item_id = ?1",
        params![item_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(to_u64(count))
}

/// Delete one comment, returning the item it belonged to.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_comment(conn: &Connection, comment_id: i64) -> Result<Option<ItemId>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "DELETE FROM comments WHERE comment_id = ?1 RETURNING item_id",
            params![comment_id],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|raw| {
        ItemId::parse(&raw).map_err(|err| {
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                Box::new(err),
            ))
        })
    })
    .transpose()
}

/// Comments for an item, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_for_item(
    conn: &Connection,
    item_id: &ItemId,
    limit: u32,
) -> Result<Vec<Comment>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT comment_id, item_id, content, author_label, created_at_ms
         FROM comments
         WHERE item_id = ?1
         ORDER BY created_at_ms DESC, comment_id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![item_id.as_str(), limit], comment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
