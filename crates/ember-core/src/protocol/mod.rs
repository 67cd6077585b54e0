//! Mutation protocols over the counter store.
//!
//! Each protocol validates its input, checks the item is live, and applies
//! exactly one conditional mutation (plus ledger or rate-window writes in the
//! same transaction where needed). All of them return the authoritative
//! post-mutation counters.
//!
//! Two expiry outcomes are kept distinct:
//! - [`ProtocolError::NotFoundOrExpired`]: the item was already gone at lookup.
//! - [`ProtocolError::ExpiredDuringMutation`]: the item was live at lookup but
//!   the conditional update matched nothing.

mod comment;
mod share;
mod view;
mod vote;

pub use view::ViewOutcome;
pub use comment::CommentOutcome;

use crate::clock::Clock;
use crate::config::EmberConfig;
use crate::db::{Store, StoreError, comments, items, migrations, sweep};
use crate::error::ErrorCode;
use crate::identity::{Identity, IdentityDeriver};
use crate::model::item::{InvalidItemId, InvalidVoteDirection};
use crate::model::{Comment, ItemId, ItemSnapshot};
use serde::Serialize;
use std::sync::Arc;

/// Errors returned by the mutation protocols.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("item {0} not found or expired")]
    NotFoundOrExpired(ItemId),

    #[error("item {0} expired while the update was being applied")]
    ExpiredDuringMutation(ItemId),

    #[error("invalid vote type '{0}': expected 'up' or 'down'")]
    InvalidVoteType(String),

    #[error("{0}")]
    Validation(String),

    #[error("identity has already voted on item {0}")]
    DuplicateVote(ItemId),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("comment {0} not found")]
    CommentNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProtocolError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFoundOrExpired(_) => ErrorCode::NotFoundOrExpired,
            Self::ExpiredDuringMutation(_) => ErrorCode::ExpiredDuringMutation,
            Self::InvalidVoteType(_) => ErrorCode::InvalidVoteType,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::DuplicateVote(_) => ErrorCode::DuplicateVote,
            Self::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            Self::CommentNotFound(_) => ErrorCode::NotFound,
            Self::Store(err) => err.code(),
        }
    }

    /// Seconds the caller should wait, for rate-limit rejections.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ProtocolError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.into())
    }
}

impl From<InvalidVoteDirection> for ProtocolError {
    fn from(err: InvalidVoteDirection) -> Self {
        Self::InvalidVoteType(err.0)
    }
}

impl From<InvalidItemId> for ProtocolError {
    fn from(err: InvalidItemId) -> Self {
        Self::Validation(format!("invalid item id '{}'", err.0))
    }
}

/// Authoritative counters together with the instant they were observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub snapshot: ItemSnapshot,
    pub at_ms: i64,
}

impl Outcome {
    /// Milliseconds until expiry as seen at `at_ms`.
    #[must_use]
    pub fn time_remaining_ms(&self) -> i64 {
        self.snapshot.time_remaining_ms(self.at_ms)
    }
}

/// Store health as reported by `em init` and `em show --status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub path: String,
    pub schema_version: u32,
    /// Zero until the first sweep.
    pub last_sweep_at_ms: i64,
    pub live_items: u64,
}

/// Entry point for every counter mutation.
///
/// Owns no mutable state of its own; share it behind an `Arc` across request
/// handlers.
#[derive(Clone)]
pub struct MetricsService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    deriver: IdentityDeriver,
    config: EmberConfig,
}

impl std::fmt::Debug for MetricsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsService")
            .field("store", &self.store.path())
            .field("deriver", &self.deriver)
            .finish_non_exhaustive()
    }
}

impl MetricsService {
    /// Build a service. An empty `identity.salt` falls back to a random
    /// per-process salt, which makes identities unstable across restarts.
    #[must_use]
    pub fn new(store: Arc<Store>, config: EmberConfig, clock: Arc<dyn Clock>) -> Self {
        let deriver = if config.identity.salt.trim().is_empty() {
            tracing::warn!("no identity salt configured; using a per-process random salt");
            IdentityDeriver::ephemeral()
        } else {
            IdentityDeriver::new(config.identity.salt.as_bytes())
        };

        Self {
            store,
            clock,
            deriver,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EmberConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Derive the identity for a request. The client hint is only honored
    /// when `identity.trust_client_hint` is set.
    #[must_use]
    pub fn identify(&self, origin: &str, signature: &str, client_hint: Option<&str>) -> Identity {
        let hint = client_hint.filter(|_| self.config.identity.trust_client_hint);
        self.deriver.derive_with_hint(origin, signature, hint)
    }

    /// Authoritative counters for a live item.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotFoundOrExpired`] for a missing or expired
    /// item, or a store error.
    pub fn counters(&self, item_id: &ItemId) -> Result<Outcome, ProtocolError> {
        let conn = self.store.conn()?;
        let at_ms = self.clock.now_ms();
        let snapshot = items::get_counters(&conn, item_id, at_ms)?
            .ok_or_else(|| ProtocolError::NotFoundOrExpired(item_id.clone()))?;
        Ok(Outcome { snapshot, at_ms })
    }

    /// Create an item with zeroed counters and the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns a store error if the insert fails.
    pub fn create_item(&self) -> Result<Outcome, ProtocolError> {
        let conn = self.store.conn()?;
        let at_ms = self.clock.now_ms();
        let snapshot = items::insert_item(&conn, self.config.items.lifetime_ms(), at_ms)?;
        tracing::info!(item_id = %snapshot.item_id, expires_at_ms = snapshot.expires_at_ms, "item created");
        Ok(Outcome { snapshot, at_ms })
    }

    /// Live items, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub fn list_live(&self, limit: u32) -> Result<Vec<ItemSnapshot>, ProtocolError> {
        let conn = self.store.conn()?;
        Ok(items::list_live(&conn, self.clock.now_ms(), limit)?)
    }

    /// Newest comments of a live item.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotFoundOrExpired`] for a missing or expired
    /// item, or a store error.
    pub fn comments(&self, item_id: &ItemId, limit: u32) -> Result<Vec<Comment>, ProtocolError> {
        let conn = self.store.conn()?;
        self.require_live(&conn, item_id)?;
        Ok(comments::list_for_item(&conn, item_id, limit)?)
    }

    /// Schema version and sweep bookkeeping of the backing store.
    ///
    /// # Errors
    ///
    /// Returns a store error if the metadata cannot be read.
    pub fn status(&self) -> Result<StoreStatus, ProtocolError> {
        let conn = self.store.conn()?;
        Ok(StoreStatus {
            path: self.store.path().display().to_string(),
            schema_version: migrations::current_schema_version(&conn)?,
            last_sweep_at_ms: sweep::last_sweep_at(&conn)?,
            live_items: items::count_live(&conn, self.now_ms())?,
        })
    }

    /// Remove expired items, lapsed view records and stale rate entries.
    ///
    /// # Errors
    ///
    /// Returns a store error if the sweep fails.
    pub fn sweep(&self) -> Result<sweep::SweepReport, ProtocolError> {
        let mut conn = self.store.conn()?;
        let horizon = crate::config::secs_to_ms(self.config.comments.window_secs);
        Ok(sweep::sweep(&mut conn, self.clock.now_ms(), horizon)?)
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    fn require_live(
        &self,
        conn: &rusqlite::Connection,
        item_id: &ItemId,
    ) -> Result<ItemSnapshot, ProtocolError> {
        items::get_counters(conn, item_id, self.now_ms())?.ok_or_else(|| {
            tracing::debug!(item_id = %item_id, "lookup found no live item");
            ProtocolError::NotFoundOrExpired(item_id.clone())
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::MetricsService;
    use crate::clock::{Clock, ManualClock};
    use crate::config::EmberConfig;
    use crate::db::Store;
    use crate::identity::Identity;
    use crate::model::ItemId;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub const NOW: i64 = 1_700_000_000_000;

    pub struct Harness {
        pub _dir: TempDir,
        pub clock: Arc<ManualClock>,
        pub service: MetricsService,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with(EmberConfig::default(), ManualClock::new(NOW))
        }

        pub fn with(mut config: EmberConfig, clock: ManualClock) -> Self {
            let dir = TempDir::new().expect("tempdir");
            let store = Store::open(&dir.path().join("ember.db")).expect("open store");
            config.identity.salt = "test-salt".to_string();
            let clock = Arc::new(clock);
            let service =
                MetricsService::new(Arc::new(store), config, Arc::clone(&clock) as Arc<dyn Clock>);
            Self {
                _dir: dir,
                clock,
                service,
            }
        }

        pub fn item(&self) -> ItemId {
            self.service.create_item().expect("create item").snapshot.item_id
        }

        pub fn identity(&self, origin: &str) -> Identity {
            self.service.identify(origin, "test-agent/1.0", None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Harness, NOW};
    use super::*;
    use crate::config::EmberConfig;
    use crate::clock::ManualClock;

    #[test]
    fn counters_hide_expired_items() {
        let harness = Harness::new();
        let item = harness.item();

        let live = harness.service.counters(&item).expect("live");
        assert_eq!(live.time_remaining_ms(), 86_400_000);

        harness.clock.advance(86_400_000);
        let err = harness.service.counters(&item).expect_err("expired");
        assert_eq!(err.code(), ErrorCode::NotFoundOrExpired);
    }

    #[test]
    fn client_hint_is_ignored_unless_trusted() {
        let harness = Harness::new();
        let plain = harness.service.identify("10.0.0.1", "ua", None);
        let hinted = harness.service.identify("10.0.0.1", "ua", Some("session-1"));
        assert_eq!(plain, hinted);

        let mut config = EmberConfig::default();
        config.identity.trust_client_hint = true;
        let trusting = Harness::with(config, ManualClock::new(NOW));
        let plain = trusting.service.identify("10.0.0.1", "ua", None);
        let hinted = trusting.service.identify("10.0.0.1", "ua", Some("session-1"));
        assert_ne!(plain.token, hinted.token);
        assert_eq!(plain.origin_hash, hinted.origin_hash);
    }

    #[test]
    fn sweep_reports_removed_items() {
        let harness = Harness::new();
        harness.item();
        harness.clock.advance(86_400_000);
        let report = harness.service.sweep().expect("sweep");
        assert_eq!(report.items_removed, 1);
        assert!(harness.service.list_live(10).expect("list").is_empty());

        let status = harness.service.status().expect("status");
        assert_eq!(status.last_sweep_at_ms, NOW + 86_400_000);
        assert_eq!(status.live_items, 0);
    }

    #[test]
    fn status_reports_schema_and_live_items() {
        let harness = Harness::new();
        harness.item();
        let status = harness.service.status().expect("status");
        assert_eq!(status.schema_version, crate::db::migrations::LATEST_SCHEMA_VERSION);
        assert_eq!(status.last_sweep_at_ms, 0);
        assert_eq!(status.live_items, 1);
    }

    #[test]
    fn comments_require_a_live_item() {
        let harness = Harness::new();
        let item = harness.item();
        let who = harness.identity("10.0.0.9");
        harness
            .service
            .create_comment(&item, "first", &who)
            .expect("comment");
        assert_eq!(harness.service.comments(&item, 10).expect("list").len(), 1);

        harness.clock.advance(86_400_000);
        assert!(matches!(
            harness.service.comments(&item, 10),
            Err(ProtocolError::NotFoundOrExpired(_))
        ));
    }

    #[test]
    fn error_codes_follow_variants() {
        let id = ItemId::parse("it-abc").expect("id");
        assert_eq!(
            ProtocolError::ExpiredDuringMutation(id.clone()).code(),
            ErrorCode::ExpiredDuringMutation
        );
        assert_eq!(ProtocolError::DuplicateVote(id).code(), ErrorCode::DuplicateVote);
        assert_eq!(
            ProtocolError::RateLimited { retry_after_secs: 7 }.retry_after_secs(),
            Some(7)
        );
        assert_eq!(ProtocolError::CommentNotFound(3).code(), ErrorCode::NotFound);
        assert_eq!(
            ProtocolError::from(InvalidVoteDirection("sideways".into())).code(),
            ErrorCode::InvalidVoteType
        );
    }
}
