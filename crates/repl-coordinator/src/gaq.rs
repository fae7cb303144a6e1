use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use repl_schemas::{Coordinate, Gtid};

/// One reserved group slot. `done` is set by the worker that commits the
/// group; the checkpoint scan advances the low-water mark past a
/// contiguous run of `done` entries from the front.
#[derive(Debug, Clone)]
pub struct GaqEntry {
    pub master_coord: Coordinate,
    pub relay_coord: Coordinate,
    pub timestamp: DateTime<Utc>,
    pub worker_id: u32,
    pub gtid: Option<Gtid>,
    pub done: bool,
}

/// Global Assigned Queue: a ring of in-flight group slots between the
/// Coordinator's dispatch point and the checkpointed low-water mark.
/// `reserve` returns a global sequence number stable across pops so a
/// Worker can mark its slot done without holding a reference into the
/// deque.
pub struct Gaq {
    capacity: usize,
    entries: VecDeque<GaqEntry>,
    front_seq: u64,
}

impl Gaq {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            front_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Reserve the next slot. Returns `None` when the GAQ is at capacity;
    /// the caller (Coordinator dispatch loop) should back off.
    pub fn reserve(
        &mut self,
        master_coord: Coordinate,
        relay_coord: Coordinate,
        timestamp: DateTime<Utc>,
        worker_id: u32,
        gtid: Option<Gtid>,
    ) -> Option<u64> {
        if self.is_full() {
            return None;
        }
        let seq = self.front_seq + self.entries.len() as u64;
        self.entries.push_back(GaqEntry {
            master_coord,
            relay_coord,
            timestamp,
            worker_id,
            gtid,
            done: false,
        });
        Some(seq)
    }

    pub fn mark_done(&mut self, seq: u64) {
        if seq < self.front_seq {
            return;
        }
        let idx = (seq - self.front_seq) as usize;
        if let Some(entry) = self.entries.get_mut(idx) {
            entry.done = true;
        }
    }

    /// Advance the low-water mark over a contiguous run of done entries,
    /// popping each and returning its coordinates and GTID in commit
    /// order, so the caller can fold every popped group into persisted
    /// state rather than only the last one.
    pub fn checkpoint(&mut self) -> Vec<(Coordinate, Coordinate, Option<Gtid>)> {
        let mut popped = Vec::new();
        while matches!(self.entries.front(), Some(e) if e.done) {
            let entry = self.entries.pop_front().expect("front checked above");
            self.front_seq += 1;
            popped.push((entry.master_coord, entry.relay_coord, entry.gtid));
        }
        popped
    }

    /// How many queue slots at the front are queue-underrun i.e. below
    /// `underrun_level` entries available for a worker to work ahead on.
    pub fn available_ahead(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    /// Per-worker bitmap of which not-yet-checkpointed slots that worker
    /// has committed, indexed from the current front of the queue. Fed
    /// into `WorkerRecord::executed_group_bitmap` on every position flush
    /// so a crash-restart can tell which groups since the last checkpoint
    /// some worker already applied.
    pub fn worker_bitmaps(&self, worker_count: u32) -> HashMap<u32, Vec<u8>> {
        let mut bitmaps: HashMap<u32, Vec<u8>> = (0..worker_count).map(|id| (id, Vec::new())).collect();
        for (slot, entry) in self.entries.iter().enumerate() {
            if !entry.done {
                continue;
            }
            let bitmap = bitmaps.entry(entry.worker_id).or_default();
            let byte = slot / 8;
            if byte >= bitmap.len() {
                bitmap.resize(byte + 1, 0);
            }
            bitmap[byte] |= 1 << (slot % 8);
        }
        bitmaps
    }
}
