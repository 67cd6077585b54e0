//! Canonical SQLite schema for the counter store.
//!
//! - `items` holds the authoritative counters and expiry per item
//! - `view_ledger` is the dedup ledger; its primary key is the only
//!   correctness mechanism for "one counted view per identity per item"
//! - `comments` and `rate_window` back comment creation and its rate limit
//! - `vote_ledger` backs the optional one-vote-per-identity policy
//! - `store_meta` tracks schema version and sweep bookkeeping

/// Migration v1: items, view ledger, comments, rate window, metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
    downvotes INTEGER NOT NULL DEFAULT 0 CHECK (downvotes >= 0),
    comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
    views INTEGER NOT NULL DEFAULT 0 CHECK (views >= 0),
    share_count INTEGER NOT NULL DEFAULT 0 CHECK (share_count >= 0),
    created_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    CHECK (item_id LIKE 'it-%'),
    CHECK (expires_at_ms > created_at_ms)
);

CREATE TABLE IF NOT EXISTS view_ledger (
    item_id TEXT NOT NULL,
    identity_token TEXT NOT NULL,
    origin_hash TEXT NOT NULL,
    signature TEXT NOT NULL DEFAULT '',
    recorded_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    PRIMARY KEY (item_id, identity_token)
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    content TEXT NOT NULL CHECK (length(trim(content)) > 0),
    author_label TEXT NOT NULL,
    origin_hash TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rate_window (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    origin_hash TEXT NOT NULL,
    action TEXT NOT NULL CHECK (length(trim(action)) > 0),
    attempted_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_expires
    ON items(expires_at_ms);

CREATE INDEX IF NOT EXISTS idx_view_ledger_expires
    ON view_ledger(expires_at_ms);

CREATE INDEX IF NOT EXISTS idx_comments_item_created
    ON comments(item_id, created_at_ms DESC);

CREATE INDEX IF NOT EXISTS idx_rate_window_origin_action
    ON rate_window(origin_hash, action, attempted_at_ms);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_sweep_at_ms INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, last_sweep_at_ms)
VALUES (1, 1, 0);
";

/// Migration v2: per-identity vote ledger.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS vote_ledger (
    item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    identity_token TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('up', 'down')),
    voted_at_ms INTEGER NOT NULL,
    PRIMARY KEY (item_id, identity_token)
);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by expiry and rate-limit query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_items_expires",
    "idx_view_ledger_expires",
    "idx_comments_item_created",
    "idx_rate_window_origin_action",
];
