//! Reconciliation engine for one item's counters.
//!
//! A [`MetricsSet`] holds the last server-confirmed `baseline` and an ordered
//! list of pending [`OptimisticUpdate`]s. [`MetricsSet::propose`] folds the
//! update into the visible counters synchronously and then spawns one
//! dispatch task that runs a bounded retry loop:
//!
//! ```text
//! attempt 1 -> transient failure -> sleep base       -> attempt 2
//!           -> transient failure -> sleep base * 2   -> attempt 3 ...
//!           -> max_attempts reached                  -> revert
//! ```
//!
//! Every task carries the generation it was spawned under. [`MetricsSet::refresh`]
//! and [`MetricsSet::shutdown`] bump the generation and abort every task, so a
//! stale resolution can never overwrite a fresher baseline. An aborted task is
//! simply dropped; it never enters backoff.
//!
//! State sits behind a `std::sync::Mutex` that is never held across an
//! `.await`.

use crate::config::ClientConfig;
use crate::optimistic::{CounterDelta, CounterPatch, OptimisticUpdate, Proposal, UpdateId, UpdateKind, fold};
use crate::transport::{MetricsTransport, TransportError};
use ember_core::ErrorCode;
use ember_core::model::{Counters, ItemId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;

const EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The server confirmed the update; its counters were merged.
    Confirmed { id: UpdateId, kind: UpdateKind },
    /// A transient failure; the next attempt starts after `delay`.
    Retrying {
        id: UpdateId,
        attempt: u32,
        delay: Duration,
    },
    /// The update was dropped and its delta no longer shows.
    Reverted {
        id: UpdateId,
        kind: UpdateKind,
        code: Option<ErrorCode>,
        reason: String,
    },
    /// A refresh installed a new baseline.
    Refreshed { counters: Counters },
    /// A resolution arrived for a superseded generation and was ignored.
    Discarded { id: Option<UpdateId> },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("metrics set for {0} has been shut down")]
    Closed(ItemId),
}

/// Outcome of [`MetricsSet::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Installed(Counters),
    /// A newer refresh or a shutdown started while this one was in flight.
    Superseded,
}

/// Running totals of how updates settled, independent of event delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub confirmed: usize,
    pub retries: usize,
    pub reverted: usize,
}

struct State {
    baseline: Counters,
    pending: Vec<OptimisticUpdate>,
    tasks: HashMap<UpdateId, AbortHandle>,
    generation: u64,
    /// Bumped on every confirmation merged into `baseline`.
    confirm_seq: u64,
    tally: Tally,
    next_id: u64,
    closed: bool,
}

impl State {
    fn abort_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
        self.pending.clear();
    }
}

struct Inner {
    item_id: ItemId,
    transport: Arc<dyn MetricsTransport>,
    config: ClientConfig,
    state: Mutex<State>,
    events: broadcast::Sender<EngineEvent>,
    in_flight: watch::Sender<usize>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_in_flight(&self, state: &State) {
        self.in_flight.send_replace(state.tasks.len());
    }

    fn mark_attempt(&self, id: UpdateId, attempt: u32) {
        let mut state = self.lock();
        if attempt > 1 {
            state.tally.retries += 1;
        }
        if let Some(update) = state.pending.iter_mut().find(|u| u.id == id) {
            update.attempt_count = attempt;
        }
    }

    async fn call(&self, proposal: &Proposal) -> Result<CounterPatch, TransportError> {
        let limit = self.config.timeouts.for_kind(proposal.kind());
        let call = async {
            match proposal {
                Proposal::Vote(direction) => self
                    .transport
                    .vote(&self.item_id, *direction)
                    .await
                    .map(|reply| CounterPatch::from(&reply)),
                Proposal::View { hint } => self
                    .transport
                    .view(&self.item_id, hint.as_deref())
                    .await
                    .map(|reply| CounterPatch::from(&reply)),
                Proposal::Share => self
                    .transport
                    .share(&self.item_id)
                    .await
                    .map(|reply| CounterPatch::from(&reply)),
                Proposal::Comment { content } => self
                    .transport
                    .comment(&self.item_id, content)
                    .await
                    .map(|reply| CounterPatch::from(&reply)),
            }
        };
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(TransportError::Timeout(limit)))
    }

    fn settle(&self, id: UpdateId, kind: UpdateKind, generation: u64, result: Result<CounterPatch, TransportError>) {
        let mut state = self.lock();
        if state.generation != generation {
            drop(state);
            tracing::debug!(item_id = %self.item_id, update = %id, "discarding stale resolution");
            self.emit(EngineEvent::Discarded { id: Some(id) });
            return;
        }

        state.tasks.remove(&id);
        state.pending.retain(|update| update.id != id);
        let event = match result {
            Ok(patch) => {
                patch.merge_into(&mut state.baseline);
                state.confirm_seq += 1;
                state.tally.confirmed += 1;
                tracing::debug!(item_id = %self.item_id, update = %id, %kind, "update confirmed");
                EngineEvent::Confirmed { id, kind }
            }
            Err(err) => {
                state.tally.reverted += 1;
                tracing::info!(
                    item_id = %self.item_id,
                    update = %id,
                    %kind,
                    code = ?err.code(),
                    error = %err,
                    "reverting optimistic update"
                );
                EngineEvent::Reverted {
                    id,
                    kind,
                    code: err.code(),
                    reason: err.to_string(),
                }
            }
        };
        // Emitted before the in-flight count drops so `wait_idle` callers
        // observe the event.
        self.emit(event);
        self.publish_in_flight(&state);
    }
}

async fn dispatch(inner: Arc<Inner>, id: UpdateId, generation: u64, proposal: Proposal) {
    let policy = inner.config.retry;
    let kind = proposal.kind();
    let mut attempt = 1;

    let result = loop {
        inner.mark_attempt(id, attempt);
        let err = match inner.call(&proposal).await {
            Ok(patch) => break Ok(patch),
            Err(err) if err.is_transient() => err,
            Err(err) => break Err(err),
        };
        if attempt >= policy.max_attempts {
            break Err(err);
        }

        let delay = policy.delay_after(attempt);
        tracing::debug!(item_id = %inner.item_id, update = %id, attempt, ?delay, error = %err, "transient failure, backing off");
        inner.emit(EngineEvent::Retrying { id, attempt, delay });
        tokio::time::sleep(delay).await;
        attempt += 1;
    };

    inner.settle(id, kind, generation, result);
}

/// Optimistic view of one item's counters.
///
/// Must be used from within a tokio runtime. Dropping the set aborts every
/// in-flight call and retry timer.
pub struct MetricsSet {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MetricsSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSet")
            .field("item_id", &self.inner.item_id)
            .finish_non_exhaustive()
    }
}

impl MetricsSet {
    #[must_use]
    pub fn new(
        item_id: ItemId,
        baseline: Counters,
        transport: Arc<dyn MetricsTransport>,
        config: ClientConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                item_id,
                transport,
                config,
                state: Mutex::new(State {
                    baseline,
                    pending: Vec::new(),
                    tasks: HashMap::new(),
                    generation: 0,
                    confirm_seq: 0,
                    tally: Tally::default(),
                    next_id: 1,
                    closed: false,
                }),
                events,
                in_flight,
            }),
        }
    }

    #[must_use]
    pub fn item_id(&self) -> &ItemId {
        &self.inner.item_id
    }

    /// Subscribe to lifecycle events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Apply `proposal` with its default delta and dispatch it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`shutdown`](Self::shutdown).
    pub fn propose(&self, proposal: Proposal) -> Result<UpdateId, EngineError> {
        let delta = proposal.default_delta();
        self.propose_with(proposal, delta)
    }

    /// Apply an explicit `delta` and dispatch `proposal`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`shutdown`](Self::shutdown).
    pub fn propose_with(&self, proposal: Proposal, delta: CounterDelta) -> Result<UpdateId, EngineError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(EngineError::Closed(self.inner.item_id.clone()));
        }

        let id = UpdateId(state.next_id);
        state.next_id += 1;
        state.pending.push(OptimisticUpdate {
            id,
            kind: proposal.kind(),
            delta,
            created_at: Instant::now(),
            attempt_count: 0,
        });

        // Spawned under the lock so the task cannot settle before its handle
        // is registered.
        let task = tokio::spawn(dispatch(
            Arc::clone(&self.inner),
            id,
            state.generation,
            proposal,
        ));
        state.tasks.insert(id, task.abort_handle());
        self.inner.publish_in_flight(&state);
        Ok(id)
    }

    /// Baseline with every pending delta folded in.
    #[must_use]
    pub fn current_view(&self) -> Counters {
        let state = self.inner.lock();
        fold(state.baseline, &state.pending)
    }

    /// Last server-confirmed counters.
    #[must_use]
    pub fn baseline(&self) -> Counters {
        self.inner.lock().baseline
    }

    /// Pending updates in insertion order.
    #[must_use]
    pub fn pending(&self) -> Vec<OptimisticUpdate> {
        self.inner.lock().pending.clone()
    }

    /// Settlement totals since the set was created.
    #[must_use]
    pub fn tally(&self) -> Tally {
        self.inner.lock().tally
    }

    /// Drop all optimistic state, cancel every in-flight call, then install
    /// the server's counters as the new baseline.
    ///
    /// When an update made after the refresh started is confirmed before the
    /// fetch returns, the fetched counters are merged instead of assigned.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the fetch fails; the baseline is left
    /// as it was and pending updates stay cleared.
    pub async fn refresh(&self) -> Result<RefreshOutcome, TransportError> {
        let (generation, confirm_seq) = {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.abort_all();
            self.inner.publish_in_flight(&state);
            (state.generation, state.confirm_seq)
        };

        let limit = self.inner.config.timeouts.refresh;
        let fetched = tokio::time::timeout(limit, self.inner.transport.fetch(&self.inner.item_id))
            .await
            .unwrap_or(Err(TransportError::Timeout(limit)))?;

        let mut state = self.inner.lock();
        if state.generation != generation || state.closed {
            drop(state);
            self.inner.emit(EngineEvent::Discarded { id: None });
            return Ok(RefreshOutcome::Superseded);
        }
        if state.confirm_seq == confirm_seq {
            state.baseline = fetched.counters;
        } else {
            // A confirmation merged while the fetch was out may be newer
            // than the fetched snapshot.
            CounterPatch::from(&fetched.counters).merge_into(&mut state.baseline);
        }
        let installed = state.baseline;
        drop(state);

        tracing::debug!(item_id = %self.inner.item_id, "baseline refreshed");
        self.inner.emit(EngineEvent::Refreshed { counters: installed });
        Ok(RefreshOutcome::Installed(installed))
    }

    /// Resolve once no dispatch task is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Cancel everything and refuse further proposals.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.generation += 1;
        state.abort_all();
        self.inner.publish_in_flight(&state);
        tracing::debug!(item_id = %self.inner.item_id, "metrics set shut down");
    }
}

impl Drop for MetricsSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}
