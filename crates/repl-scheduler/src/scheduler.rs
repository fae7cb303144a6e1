use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::group::{conflicts_with_any, Group};

pub struct SchedulerConfig {
    /// Max groups sitting in the FIFO before `enqueue` blocks.
    pub mts_dependency_size: u32,
    /// Once pending drops to or below this, the Coordinator's feed loop
    /// should top the queue back up; exposed via `below_refill_threshold`.
    pub refill_threshold: u32,
    pub max_keys_per_group: u32,
    pub order_commits: bool,
    pub basic_nap: Duration,
}

struct Inner {
    pending: VecDeque<Group>,
    in_flight: HashMap<u64, Group>,
    next_group_id: u64,
    stopped: bool,
}

/// Alternative multi-threaded apply mode: groups queue in one shared FIFO
/// tagged with a precomputed write-key conflict set; a Worker may take the
/// head-most group whose keys don't intersect any group already in
/// flight. Equivalent in spirit to `mts_submode=database` plus explicit
/// dependency tracking instead of a fixed per-database hash.
pub struct DependencyScheduler {
    inner: Mutex<Inner>,
    notify: Notify,
    config: SchedulerConfig,
}

impl DependencyScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                next_group_id: 0,
                stopped: false,
            }),
            notify: Notify::new(),
            config,
        }
    }

    /// Queue a group, blocking while the FIFO is already at
    /// `mts_dependency_size`. Returns the group id assigned (its commit
    /// order ticket when `order_commits` is set).
    pub async fn enqueue(&self, keys: std::collections::HashSet<String>, events: Vec<repl_schemas::Event>) -> u64 {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if (inner.pending.len() as u32) < self.config.mts_dependency_size {
                    let id = inner.next_group_id;
                    inner.next_group_id += 1;
                    inner.pending.push_back(Group { id, keys, events });
                    drop(inner);
                    self.notify.notify_waiters();
                    return id;
                }
            }
            tokio::time::sleep(self.config.basic_nap).await;
        }
    }

    /// Pop the first pending group whose keys don't conflict with any
    /// in-flight group. Blocks until one is available or the scheduler is
    /// stopped, in which case it returns `None`.
    pub async fn take(&self) -> Option<Group> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.stopped {
                    return None;
                }
                let candidate_idx = inner
                    .pending
                    .iter()
                    .position(|g| !conflicts_with_any(&g.keys, inner.in_flight.values().map(|g| &g.keys)));
                if let Some(idx) = candidate_idx {
                    let group = inner.pending.remove(idx).expect("index just found");
                    inner.in_flight.insert(group.id, group.clone());
                    return Some(group);
                }
            }
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(self.config.basic_nap) => {}
            }
        }
    }

    /// Release a group's keys back out of the in-flight set once its
    /// Worker has finished applying (and, if `order_commits`, committing)
    /// it, unblocking any conflicting group waiting in `take`.
    pub async fn complete(&self, group_id: u64) {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&group_id);
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn below_refill_threshold(&self) -> bool {
        (self.inner.lock().await.pending.len() as u32) <= self.config.refill_threshold
    }

    /// Stop accepting new `take` calls. The groups still sitting in the
    /// FIFO are discarded and returned to the caller (nothing was applied
    /// for them); the groups already pulled are returned separately so the
    /// caller can instruct their owning Workers to roll back.
    pub async fn stop_discard_pending(&self) -> (Vec<Group>, Vec<u64>) {
        let mut inner = self.inner.lock().await;
        inner.stopped = true;
        let discarded: Vec<Group> = inner.pending.drain(..).collect();
        let in_flight_ids: Vec<u64> = inner.in_flight.keys().copied().collect();
        if !discarded.is_empty() {
            warn!(count = discarded.len(), "discarding pending dependency-scheduler groups on stop");
        }
        drop(inner);
        self.notify.notify_waiters();
        (discarded, in_flight_ids)
    }
}
