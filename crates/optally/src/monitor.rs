//! Monitor: the poll loop that follows the irreversible head block by block.
//!
//! A [Monitor] owns the whole aggregate state. Each tick runs [Monitor::run_cycle]:
//! it fetches the irreversible head, then fetches, folds and broadcasts one block at
//! a time until the cursor passes the head or a block exhausts its retries. Cycles and
//! resets exclude each other through one busy flag taken with a compare-and-swap;
//! a tick that finds the flag taken returns without doing any I/O.

use crate::aggregate::Snapshot;
use crate::config::{MonitorConfig, ResetPolicy, RetryConfig};
use crate::cursor::Cursor;
use crate::notify::{DataPayload, MonitorEvent, Notifier};
use crate::retry::fetch_block_with_retry;
use crate::rpc::BlockSource;
use crate::store::{PersistedState, SnapshotStore};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Coarse state of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    Uninitialized,
    CaughtUp,
    CatchingUp,
    Paused,
    Busy,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Paused by the operator; nothing attempted.
    Paused,
    /// Another cycle or a reset holds the busy flag; nothing attempted.
    Busy,
    /// The chain head could not be fetched; cursor unchanged.
    HeadUnavailable,
    /// First head seen; the cursor now starts right after it.
    Initialized { head: u64 },
    /// `blocks` blocks were processed. `gave_up` is the block whose retries ran out, if any.
    Processed {
        blocks: u64,
        head: u64,
        gave_up: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Done,
    /// A cycle was in flight; nothing was cleared.
    Busy,
}

/// Releases the busy flag on drop.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Poll loop context: aggregate state, pause flag, busy flag, and the collaborators.
pub struct Monitor<S, P> {
    source: S,
    store: P,
    notifier: Notifier,
    retry: RetryConfig,
    reset_policy: ResetPolicy,
    poll_interval: Duration,
    snapshot: RwLock<Snapshot>,
    paused: AtomicBool,
    busy: AtomicBool,
    catching_up: AtomicBool,
    save_lock: Mutex<()>,
}

impl<S, P> Monitor<S, P>
where
    S: BlockSource,
    P: SnapshotStore,
{
    /// Fresh monitor: empty counters, uninitialized cursor, paused.
    pub fn new(source: S, store: P, config: &MonitorConfig) -> Self {
        Self::with_state(
            source,
            store,
            config,
            PersistedState {
                snapshot: Snapshot::default(),
                paused: true,
            },
        )
    }

    pub fn with_state(source: S, store: P, config: &MonitorConfig, state: PersistedState) -> Self {
        Self {
            source,
            store,
            notifier: Notifier::default(),
            retry: config.retry.clone(),
            reset_policy: config.reset_policy,
            poll_interval: config.poll_interval,
            snapshot: RwLock::new(state.snapshot),
            paused: AtomicBool::new(state.paused),
            busy: AtomicBool::new(false),
            catching_up: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        }
    }

    /// Monitor resumed from the store. A missing or unreadable record starts fresh (paused).
    pub async fn restore(source: S, store: P, config: &MonitorConfig) -> Self {
        match store.load().await {
            Ok(Some(state)) => {
                tracing::info!(
                    last_processed_block = state.snapshot.cursor.last_processed_block,
                    blocks_processed = state.snapshot.blocks_processed,
                    paused = state.paused,
                    "restored persisted state"
                );
                Self::with_state(source, store, config, state)
            }
            Ok(None) => Self::new(source, store, config),
            Err(e) => {
                tracing::warn!(reason = %e, "could not load persisted state, starting fresh");
                Self::new(source, store, config)
            }
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.notifier.subscribe()
    }

    /// Copy of the current aggregate state.
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// `getData` reply.
    pub async fn data(&self) -> DataPayload {
        DataPayload::data(&*self.snapshot.read().await)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Set the pause flag and persist it with the current state.
    pub async fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::AcqRel);
        if was != paused {
            tracing::info!(paused, "pause state changed");
        }
        self.persist().await;
    }

    pub async fn state(&self) -> MonitorState {
        if self.is_paused() {
            MonitorState::Paused
        } else if self.catching_up.load(Ordering::Acquire) {
            MonitorState::CatchingUp
        } else if self.busy.load(Ordering::Acquire) {
            MonitorState::Busy
        } else if !self.snapshot.read().await.cursor.is_initialized() {
            MonitorState::Uninitialized
        } else {
            MonitorState::CaughtUp
        }
    }

    fn try_enter(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: &self.busy })
    }

    /// One poll tick.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self.is_paused() {
            return CycleOutcome::Paused;
        }
        let Some(_busy) = self.try_enter() else {
            tracing::trace!("cycle already in flight, skipping tick");
            return CycleOutcome::Busy;
        };

        let mut head = match self.source.fetch_chain_head().await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(reason = %e, "failed to fetch irreversible head");
                return CycleOutcome::HeadUnavailable;
            }
        };

        let mut snapshot = self.snapshot.read().await.clone();
        if !snapshot.cursor.is_initialized() {
            snapshot.cursor = Cursor::new(head);
            *self.snapshot.write().await = snapshot;
            tracing::info!(head, "initial last irreversible block");
            self.persist().await;
            return CycleOutcome::Initialized { head };
        }

        let mut blocks = 0;
        let mut gave_up = None;
        self.catching_up
            .store(snapshot.cursor.is_behind(head), Ordering::Release);
        while snapshot.cursor.is_behind(head) {
            if self.is_paused() {
                tracing::debug!("paused while catching up");
                break;
            }
            let block = snapshot.cursor.next_block_to_check;
            let operations = match fetch_block_with_retry(&self.source, block, &self.retry).await {
                Ok(ops) => ops,
                Err(e) => {
                    tracing::warn!(
                        block,
                        attempts = e.attempts,
                        reason = %e.last_error,
                        "giving up on block until next tick"
                    );
                    gave_up = Some(block);
                    break;
                }
            };

            let mut next = snapshot.apply(&operations);
            next.cursor.advance();
            *self.snapshot.write().await = next.clone();
            self.notifier.publish_update(&next);
            tracing::debug!(
                block,
                operations = operations.len(),
                operations_per_second = next.throughput.operations_per_second,
                "block processed"
            );
            snapshot = next;
            blocks += 1;

            match self.source.fetch_chain_head().await {
                Ok(h) => head = h,
                Err(e) => tracing::debug!(reason = %e, head, "head refresh failed, keeping previous head"),
            }
        }
        self.catching_up.store(false, Ordering::Release);

        self.persist().await;
        CycleOutcome::Processed {
            blocks,
            head,
            gave_up,
        }
    }

    /// Clear all counters in one step, persist, and notify observers.
    ///
    /// Shares the busy flag with [Monitor::run_cycle]; while a cycle runs the reset is refused.
    pub async fn reset(&self) -> ResetOutcome {
        let Some(_busy) = self.try_enter() else {
            tracing::debug!("reset refused, cycle in flight");
            return ResetOutcome::Busy;
        };
        let keep_cursor = self.reset_policy == ResetPolicy::KeepCursor;
        let cleared = {
            let mut guard = self.snapshot.write().await;
            *guard = guard.cleared(keep_cursor);
            guard.clone()
        };
        tracing::info!(keep_cursor, "counters reset");
        self.persist().await;
        self.notifier.publish(MonitorEvent::DataUpdated);
        self.notifier.publish_update(&cleared);
        ResetOutcome::Done
    }

    /// Save the current state and pause flag. Failures are logged; memory is not rolled back.
    async fn persist(&self) {
        let _save = self.save_lock.lock().await;
        let state = PersistedState {
            snapshot: self.snapshot.read().await.clone(),
            paused: self.is_paused(),
        };
        if let Err(e) = self.store.save(&state).await {
            tracing::warn!(reason = %e, "failed to persist state");
        }
    }
}

impl<S, P> Monitor<S, P>
where
    S: BlockSource + 'static,
    P: SnapshotStore + 'static,
{
    /// Periodic trigger. Every tick spawns a cycle, so a slow cycle never delays the
    /// cadence; overlapping ticks come back [CycleOutcome::Busy]. Never returns.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let monitor = Arc::clone(&self);
            tokio::spawn(async move {
                let outcome = monitor.run_cycle().await;
                tracing::trace!(?outcome, "tick finished");
            });
        }
    }
}
