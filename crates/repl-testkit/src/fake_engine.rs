use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use repl_engine::StorageEngine;
use repl_schemas::{Event, ReplError};
use tokio::sync::Mutex;

/// In-memory `StorageEngine` that records every applied event in order
/// and can be told to fail the next N `apply` calls with a transient
/// error, for exercising the Applier's/Coordinator's retry path.
#[derive(Default)]
pub struct FakeStorageEngine {
    applied: Mutex<Vec<Event>>,
    commits: AtomicU32,
    rollbacks: AtomicU32,
    fail_next_applies: AtomicU32,
    skip_before_failing: AtomicU32,
}

impl FakeStorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_applies(self, count: u32) -> Self {
        self.fail_next_applies.store(count, Ordering::SeqCst);
        self
    }

    /// Let the first `skip` apply calls succeed, then fail the next `count`.
    /// Lets a test put the failure on a specific event within a group
    /// instead of always the group's first event.
    pub fn with_failing_applies_after(self, skip: u32, count: u32) -> Self {
        self.skip_before_failing.store(skip, Ordering::SeqCst);
        self.fail_next_applies.store(count, Ordering::SeqCst);
        self
    }

    pub async fn applied_events(&self) -> Vec<Event> {
        self.applied.lock().await.clone()
    }

    pub async fn applied_count(&self) -> usize {
        self.applied.lock().await.len()
    }

    pub fn commit_count(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for FakeStorageEngine {
    async fn apply(&self, event: &Event) -> Result<(), ReplError> {
        let skip = self.skip_before_failing.load(Ordering::SeqCst);
        if skip > 0 {
            self.skip_before_failing.store(skip - 1, Ordering::SeqCst);
            self.applied.lock().await.push(event.clone());
            return Ok(());
        }
        let remaining = self.fail_next_applies.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_applies.store(remaining - 1, Ordering::SeqCst);
            return Err(ReplError::EngineTransient {
                message: "fake engine deadlock".into(),
            });
        }
        self.applied.lock().await.push(event.clone());
        Ok(())
    }

    async fn commit_group(&self) -> Result<(), ReplError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_group(&self) -> Result<(), ReplError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
