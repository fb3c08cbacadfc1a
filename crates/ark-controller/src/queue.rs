//! Deduplicating work queue of agent keys
//!
//! - a key sits in the queue at most once, however often it is added
//! - a key handed out by [`WorkQueue::get`] is not handed out again until
//!   [`WorkQueue::done`]; adds in between are parked and re-queued by `done`
//! - delayed adds and per-key exponential backoff for retries; each key has
//!   at most one armed timer, the earliest deadline asked for
//!
//! After [`WorkQueue::shutdown`] every waiting `get` returns `None` and new
//! adds are dropped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ark_state::ObjectKey;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-key exponential retry delay: `base * 2^failures`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `failures` (zero-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    /// Keys waiting to be handed out, including parked ones.
    dirty: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    /// Deadline of the armed delayed add per key.
    timers: HashMap<ObjectKey, Instant>,
    shutting_down: bool,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: Backoff,
    stop: CancellationToken,
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
            stop: CancellationToken::new(),
        })
    }

    /// Queue `key` now.
    pub fn add(&self, key: ObjectKey) {
        let mut state = lock(&self.state);
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Queue `key` once `delay` has elapsed.
    ///
    /// A key already armed for the same or an earlier deadline is left alone;
    /// an earlier deadline replaces a later one.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let deadline = Instant::now() + delay;
        {
            let mut state = lock(&self.state);
            if state.shutting_down {
                return;
            }
            if state.timers.get(&key).is_some_and(|armed| *armed <= deadline) {
                return;
            }
            state.timers.insert(key.clone(), deadline);
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.stop.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => queue.fire(key, deadline),
            }
        });
    }

    /// Deliver a delayed add unless a newer deadline superseded it.
    fn fire(&self, key: ObjectKey, deadline: Instant) {
        {
            let mut state = lock(&self.state);
            if state.timers.get(&key) != Some(&deadline) {
                return;
            }
            state.timers.remove(&key);
        }
        self.add(key);
    }

    /// Keys with an armed delayed add.
    pub fn num_waiting(&self) -> usize {
        lock(&self.state).timers.len()
    }

    /// Queue `key` after its backoff delay and record one more failure.
    /// Returns the failure count including this one.
    pub fn add_rate_limited(self: &Arc<Self>, key: ObjectKey) -> u32 {
        let failures = {
            let mut state = lock(&self.state);
            let entry = state.failures.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.add_after(key, self.backoff.delay(failures - 1));
        failures
    }

    /// Reset `key`'s failure count.
    pub fn forget(&self, key: &ObjectKey) {
        lock(&self.state).failures.remove(key);
    }

    pub fn num_requeues(&self, key: &ObjectKey) -> u32 {
        lock(&self.state).failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = lock(&self.state);
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as finished; a re-add parked during processing is queued.
    pub fn done(&self, key: &ObjectKey) {
        let mut state = lock(&self.state);
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Keys currently waiting to be handed out.
    pub fn len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        lock(&self.state).shutting_down = true;
        self.stop.cancel();
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        lock(&self.state).shutting_down
    }
}
