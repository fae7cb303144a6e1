use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use repl_schemas::{Event, EventPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Hash the event's database name to a worker; same database always
    /// lands on the same worker. A group touching more than one database
    /// is `group_isolated`: the Coordinator drains every worker it would
    /// touch before assigning it.
    DatabaseKey,
    /// A group carries a commit-parent sequence from the primary and is
    /// dispatched once all parents have committed. See `repl-scheduler`
    /// for the key-conflict variant of this idea.
    LogicalClock,
}

pub fn worker_for_db(db: &str, worker_count: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    db.hash(&mut hasher);
    (hasher.finish() % worker_count as u64) as u32
}

fn event_db_key(event: &Event) -> Option<&str> {
    match &event.payload {
        EventPayload::Opaque { db, .. } => db.as_deref(),
        _ => None,
    }
}

/// Tracks which databases the in-progress group has touched, to decide
/// whether it must be `group_isolated` (serialized across every worker it
/// touches) before the Coordinator can safely dispatch it.
#[derive(Default)]
pub struct GroupDbTracker {
    databases: HashSet<String>,
}

impl GroupDbTracker {
    pub fn observe(&mut self, event: &Event) {
        if let Some(db) = event_db_key(event) {
            self.databases.insert(db.to_string());
        }
    }

    pub fn is_multi_db(&self) -> bool {
        self.databases.len() > 1
    }

    pub fn workers_touched(&self, worker_count: u32) -> Vec<u32> {
        self.databases.iter().map(|db| worker_for_db(db, worker_count)).collect()
    }

    pub fn reset(&mut self) {
        self.databases.clear();
    }
}

pub fn choose_worker(mode: PartitionMode, event: &Event, worker_count: u32, commit_parents_done: bool) -> Option<u32> {
    match mode {
        PartitionMode::DatabaseKey => {
            let db = event_db_key(event).unwrap_or("");
            Some(worker_for_db(db, worker_count))
        }
        PartitionMode::LogicalClock => {
            if commit_parents_done {
                let db = event_db_key(event).unwrap_or("");
                Some(worker_for_db(db, worker_count))
            } else {
                None
            }
        }
    }
}
