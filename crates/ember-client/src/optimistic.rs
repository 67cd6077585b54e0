//! Optimistic updates and the arithmetic of folding them over a baseline.
//!
//! The visible counters are always `baseline` with every pending delta
//! applied in insertion order. `Add` deltas accumulate; a `Set` delta
//! overwrites whatever the field held at that point in the fold, so the last
//! writer wins.

use ember_core::api::{CommentResponse, ShareResponse, ViewResponse, VoteResponse};
use ember_core::model::{Counters, VoteDirection};
use std::fmt;
use tokio::time::Instant;

/// Which protocol an update is dispatched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Vote,
    Comment,
    View,
    Share,
}

impl UpdateKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vote => "vote",
            Self::Comment => "comment",
            Self::View => "view",
            Self::Share => "share",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counter of [`Counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Upvotes,
    Downvotes,
    CommentCount,
    Views,
    ShareCount,
}

impl Field {
    fn slot(self, counters: &mut Counters) -> &mut u64 {
        match self {
            Self::Upvotes => &mut counters.upvotes,
            Self::Downvotes => &mut counters.downvotes,
            Self::CommentCount => &mut counters.comment_count,
            Self::Views => &mut counters.views,
            Self::ShareCount => &mut counters.share_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDelta {
    Add(i64),
    Set(u64),
}

/// Ordered per-field changes carried by one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterDelta {
    changes: Vec<(Field, FieldDelta)>,
}

impl CounterDelta {
    #[must_use]
    pub fn add(mut self, field: Field, amount: i64) -> Self {
        self.changes.push((field, FieldDelta::Add(amount)));
        self
    }

    #[must_use]
    pub fn set(mut self, field: Field, value: u64) -> Self {
        self.changes.push((field, FieldDelta::Set(value)));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply in order. Counters never go below zero.
    pub fn apply_to(&self, counters: &mut Counters) {
        for (field, delta) in &self.changes {
            let slot = field.slot(counters);
            *slot = match *delta {
                FieldDelta::Add(amount) => slot.saturating_add_signed(amount),
                FieldDelta::Set(value) => value,
            };
        }
    }
}

/// What the caller wants to do. Carries the request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    Vote(VoteDirection),
    View { hint: Option<String> },
    Share,
    Comment { content: String },
}

impl Proposal {
    #[must_use]
    pub const fn kind(&self) -> UpdateKind {
        match self {
            Self::Vote(_) => UpdateKind::Vote,
            Self::View { .. } => UpdateKind::View,
            Self::Share => UpdateKind::Share,
            Self::Comment { .. } => UpdateKind::Comment,
        }
    }

    /// The delta a successful call is expected to produce.
    #[must_use]
    pub fn default_delta(&self) -> CounterDelta {
        let field = match self {
            Self::Vote(VoteDirection::Up) => Field::Upvotes,
            Self::Vote(VoteDirection::Down) => Field::Downvotes,
            Self::View { .. } => Field::Views,
            Self::Share => Field::ShareCount,
            Self::Comment { .. } => Field::CommentCount,
        };
        CounterDelta::default().add(field, 1)
    }
}

/// Engine-assigned update identifier, unique per metrics set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdateId(pub(crate) u64);

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// A locally applied, not yet confirmed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticUpdate {
    pub id: UpdateId,
    pub kind: UpdateKind,
    pub delta: CounterDelta,
    pub created_at: Instant,
    /// Dispatch attempts started so far.
    pub attempt_count: u32,
}

/// Authoritative values carried by one server reply. Fields the reply does
/// not mention stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterPatch {
    pub upvotes: Option<u64>,
    pub downvotes: Option<u64>,
    pub comment_count: Option<u64>,
    pub views: Option<u64>,
    pub share_count: Option<u64>,
}

impl CounterPatch {
    /// Merge into a baseline.
    ///
    /// Votes, views and shares only grow on the server, so taking the max
    /// keeps an older reply that lands late from regressing the baseline.
    /// The comment count can shrink and is assigned.
    pub fn merge_into(&self, baseline: &mut Counters) {
        fn grow(slot: &mut u64, value: Option<u64>) {
            if let Some(value) = value {
                *slot = (*slot).max(value);
            }
        }
        grow(&mut baseline.upvotes, self.upvotes);
        grow(&mut baseline.downvotes, self.downvotes);
        grow(&mut baseline.views, self.views);
        grow(&mut baseline.share_count, self.share_count);
        if let Some(count) = self.comment_count {
            baseline.comment_count = count;
        }
    }
}

impl From<&Counters> for CounterPatch {
    fn from(counters: &Counters) -> Self {
        Self {
            upvotes: Some(counters.upvotes),
            downvotes: Some(counters.downvotes),
            comment_count: Some(counters.comment_count),
            views: Some(counters.views),
            share_count: Some(counters.share_count),
        }
    }
}

impl From<&VoteResponse> for CounterPatch {
    fn from(reply: &VoteResponse) -> Self {
        Self {
            upvotes: Some(reply.upvotes),
            downvotes: Some(reply.downvotes),
            ..Self::default()
        }
    }
}

impl From<&ViewResponse> for CounterPatch {
    fn from(reply: &ViewResponse) -> Self {
        Self {
            views: Some(reply.view_count),
            ..Self::default()
        }
    }
}

impl From<&ShareResponse> for CounterPatch {
    fn from(reply: &ShareResponse) -> Self {
        Self {
            share_count: Some(reply.share_count),
            ..Self::default()
        }
    }
}

impl From<&CommentResponse> for CounterPatch {
    fn from(reply: &CommentResponse) -> Self {
        Self {
            comment_count: Some(reply.comment_count),
            ..Self::default()
        }
    }
}

/// `baseline` with every pending delta folded in, in order.
#[must_use]
pub fn fold<'a>(baseline: Counters, pending: impl IntoIterator<Item = &'a OptimisticUpdate>) -> Counters {
    let mut view = baseline;
    for update in pending {
        update.delta.apply_to(&mut view);
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn update(id: u64, delta: CounterDelta) -> OptimisticUpdate {
        OptimisticUpdate {
            id: UpdateId(id),
            kind: UpdateKind::Vote,
            delta,
            created_at: Instant::now(),
            attempt_count: 0,
        }
    }

    fn base() -> Counters {
        Counters {
            upvotes: 10,
            downvotes: 3,
            ..Counters::default()
        }
    }

    #[test]
    fn adds_accumulate_in_order() {
        let pending = [
            update(1, Proposal::Vote(VoteDirection::Up).default_delta()),
            update(2, Proposal::Vote(VoteDirection::Up).default_delta()),
        ];
        let view = fold(base(), &pending);
        assert_eq!(view.upvotes, 12);
        assert_eq!(view.net_votes(), 9);
    }

    #[test]
    fn set_is_last_writer_wins() {
        let pending = [
            update(1, CounterDelta::default().add(Field::CommentCount, 1)),
            update(2, CounterDelta::default().set(Field::CommentCount, 7)),
            update(3, CounterDelta::default().add(Field::CommentCount, 1)),
        ];
        assert_eq!(fold(base(), &pending).comment_count, 8);

        let pending = [
            update(1, CounterDelta::default().set(Field::Views, 4)),
            update(2, CounterDelta::default().set(Field::Views, 2)),
        ];
        assert_eq!(fold(base(), &pending).views, 2);
    }

    #[test]
    fn negative_adds_stop_at_zero() {
        let pending = [update(1, CounterDelta::default().add(Field::ShareCount, -5))];
        assert_eq!(fold(base(), &pending).share_count, 0);
    }

    #[test]
    fn patch_merge_never_regresses_grow_only_counters() {
        let mut baseline = base();
        CounterPatch {
            upvotes: Some(12),
            downvotes: Some(3),
            ..CounterPatch::default()
        }
        .merge_into(&mut baseline);
        CounterPatch {
            upvotes: Some(11),
            downvotes: Some(3),
            ..CounterPatch::default()
        }
        .merge_into(&mut baseline);
        assert_eq!(baseline.upvotes, 12);
    }

    #[test]
    fn patch_assigns_comment_count() {
        let mut baseline = Counters {
            comment_count: 5,
            ..Counters::default()
        };
        CounterPatch {
            comment_count: Some(4),
            ..CounterPatch::default()
        }
        .merge_into(&mut baseline);
        assert_eq!(baseline.comment_count, 4);
    }

    proptest! {
        #[test]
        fn add_only_fold_is_baseline_plus_sum(amounts in proptest::collection::vec(0_i64..50, 0..20)) {
            let pending: Vec<_> = amounts
                .iter()
                .enumerate()
                .map(|(n, amount)| update(n as u64, CounterDelta::default().add(Field::Views, *amount)))
                .collect();
            let expected: i64 = amounts.iter().sum();
            prop_assert_eq!(fold(base(), &pending).views, expected as u64);
        }

        #[test]
        fn fold_over_nothing_is_identity(up in 0_u64..1_000, down in 0_u64..1_000) {
            let baseline = Counters { upvotes: up, downvotes: down, ..Counters::default() };
            prop_assert_eq!(fold(baseline, std::iter::empty()), baseline);
        }
    }
}
