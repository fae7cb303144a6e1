use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use repl_controller::{ReplicaThread, ThreadSnapshot};
use repl_schemas::RunningState;

/// `ReplicaThread` double with no real IO loop behind it: `request_stop`
/// flips straight to `Stopped` and counts every call, for asserting a
/// controller's `stop` is idempotent.
pub struct FakeReplicaThread {
    running: AtomicBool,
    stop_calls: AtomicU32,
}

impl FakeReplicaThread {
    pub fn new(running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            stop_calls: AtomicU32::new(0),
        }
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplicaThread for FakeReplicaThread {
    async fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            running: if self.running.load(Ordering::SeqCst) { RunningState::Running } else { RunningState::Stopped },
            last_error: None,
        }
    }

    fn request_start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn request_stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}
