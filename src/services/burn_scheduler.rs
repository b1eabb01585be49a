//! Per-message burn timers.
//!
//! Each armed message gets one tokio task that sleeps until the message's
//! deadline and then burns it. Timers live in a map owned by the scheduler;
//! re-arming a message aborts its previous task, and every timer carries a
//! generation so a task that lost the race never disarms its successor.

use crate::clock::Clock;
use crate::models::{Message, MessageId, RemoteSync, SweepReport, SyncOutcome};
use crate::services::expiry::ExpiryPolicy;
use crate::services::gateway::ChatGateway;
use crate::state::SharedState;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    state: SharedState,
    gateway: Arc<dyn ChatGateway>,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<MessageId, ArmedTimer>>,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct BurnScheduler {
    inner: Arc<Inner>,
}

impl BurnScheduler {
    pub(crate) fn new(
        state: SharedState,
        gateway: Arc<dyn ChatGateway>,
        policy: ExpiryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                gateway,
                policy,
                clock,
                timers: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Arm a burn timer for `message`, replacing any existing one.
    ///
    /// Returns the wait before the burn fires, or `None` when no expiry rule
    /// applies yet (an unread read-gated message) or no runtime is available.
    pub fn schedule(&self, message: &Message) -> Option<Duration> {
        let now = self.inner.clock.now();
        let wait = self
            .inner
            .policy
            .time_until_burn(message, now)?
            .to_std()
            .unwrap_or_default();

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(message_id = message.id, "no tokio runtime; burn timer not armed");
                return None;
            }
        };

        let id = message.id;
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        // Insert under the lock the task needs, so it cannot disarm before
        // its own entry exists.
        let mut timers = self.inner.timers.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let scheduler = BurnScheduler { inner };
            if scheduler.disarm(id, generation) {
                scheduler.burn(id).await;
            }
        });
        if let Some(previous) = timers.insert(id, ArmedTimer { generation, handle }) {
            previous.handle.abort();
        }
        drop(timers);

        debug!(message_id = id, wait_ms = wait.as_millis() as u64, "burn timer armed");
        Some(wait)
    }

    /// Burn a visible message locally, then tell the server.
    ///
    /// Idempotent: a message that is not visible or already deleted yields
    /// `NoOp`/`Skipped`. A failed notification is logged and reported but
    /// never undoes the local burn.
    pub async fn burn(&self, id: MessageId) -> SyncOutcome {
        self.cancel(id);

        let burned = self.inner.state.lock().burn(id);
        if burned.is_none() {
            return SyncOutcome::noop();
        }

        info!(message_id = id, "message burned");
        SyncOutcome::applied(self.notify(id).await)
    }

    /// Burn every held message that is due at `now`.
    ///
    /// All local burns happen before the first notification is awaited.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let burned = self.burn_due(now);
        self.notify_all(burned).await
    }

    /// Like [`sweep`](Self::sweep), but the server notifications run on a
    /// spawned task. Returns the ids burned locally.
    pub fn sweep_detached(&self, now: DateTime<Utc>) -> Vec<MessageId> {
        let burned = self.burn_due(now);
        if burned.is_empty() {
            return burned;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                let scheduler = self.clone();
                let ids = burned.clone();
                runtime.spawn(async move {
                    scheduler.notify_all(ids).await;
                });
            }
            Err(_) => warn!(count = burned.len(), "no tokio runtime; burn notifications dropped"),
        }
        burned
    }

    fn burn_due(&self, now: DateTime<Utc>) -> Vec<MessageId> {
        let due: Vec<MessageId> = {
            let state = self.inner.state.lock();
            state
                .messages
                .iter()
                .filter(|view| self.inner.policy.should_burn(&view.message, now))
                .map(|view| view.id())
                .collect()
        };

        let mut burned = Vec::with_capacity(due.len());
        for id in due {
            self.cancel(id);
            if self.inner.state.lock().burn(id).is_some() {
                burned.push(id);
            }
        }

        if !burned.is_empty() {
            info!(count = burned.len(), "sweep burned expired messages");
        }
        burned
    }

    async fn notify_all(&self, burned: Vec<MessageId>) -> SweepReport {
        if burned.is_empty() {
            return SweepReport::default();
        }

        let results = join_all(
            burned
                .iter()
                .map(|&id| async move { (id, self.notify(id).await) }),
        )
        .await;

        let notify_failures = results
            .into_iter()
            .filter(|(_, remote)| matches!(remote, RemoteSync::Failed(_)))
            .map(|(id, _)| id)
            .collect();

        SweepReport {
            burned,
            notify_failures,
        }
    }

    /// Abort the timer for `id`. Returns whether one was armed.
    pub fn cancel(&self, id: MessageId) -> bool {
        match self.inner.timers.lock().remove(&id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<ArmedTimer> = self.inner.timers.lock().drain().map(|(_, t)| t).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelling burn timers");
        }
        for timer in drained {
            timer.handle.abort();
        }
    }

    pub fn is_scheduled(&self, id: MessageId) -> bool {
        self.inner.timers.lock().contains_key(&id)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.inner.timers.lock().len()
    }

    // Called by a firing timer: drop its own entry without aborting itself.
    fn disarm(&self, id: MessageId, generation: u64) -> bool {
        let mut timers = self.inner.timers.lock();
        match timers.get(&id) {
            Some(timer) if timer.generation == generation => {
                timers.remove(&id);
                true
            }
            _ => false,
        }
    }

    async fn notify(&self, id: MessageId) -> RemoteSync {
        match self.inner.gateway.burn_message(id).await {
            Ok(()) => RemoteSync::Synced,
            Err(e) => {
                warn!(message_id = id, error = %e, "burn notification failed");
                RemoteSync::Failed(e.to_string())
            }
        }
    }
}
