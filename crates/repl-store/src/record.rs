use repl_schemas::Coordinate;
use serde::{Deserialize, Serialize};

/// Everything a crash-safe restart needs to rebuild `ReceiverState` and
/// `ApplierState` without re-reading the relay log from the beginning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub master_coord: Coordinate,
    pub relay_coord: Coordinate,
    pub retrieved_gtids_text: String,
    pub logged_gtids_text: String,
    pub workers: Vec<WorkerRecord>,
}

impl PersistedState {
    pub fn new(master_coord: Coordinate, relay_coord: Coordinate) -> Self {
        Self {
            master_coord,
            relay_coord,
            retrieved_gtids_text: String::new(),
            logged_gtids_text: String::new(),
            workers: Vec::new(),
        }
    }
}

/// One row per configured worker. `executed_group_bitmap` records which GAQ
/// slots since the last checkpoint have committed, so a restart can replay
/// only the gaps instead of the whole window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: u32,
    pub last_committed_group_master_coord: Coordinate,
    pub last_committed_group_relay_coord: Coordinate,
    pub executed_group_bitmap: Vec<u8>,
}

impl WorkerRecord {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            last_committed_group_master_coord: Coordinate::new(String::new(), 0),
            last_committed_group_relay_coord: Coordinate::new(String::new(), 0),
            executed_group_bitmap: Vec::new(),
        }
    }

    pub fn bit_set(&mut self, slot: usize) {
        let byte = slot / 8;
        if byte >= self.executed_group_bitmap.len() {
            self.executed_group_bitmap.resize(byte + 1, 0);
        }
        self.executed_group_bitmap[byte] |= 1 << (slot % 8);
    }

    pub fn bit_is_set(&self, slot: usize) -> bool {
        let byte = slot / 8;
        self.executed_group_bitmap
            .get(byte)
            .map(|b| b & (1 << (slot % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn clear_bitmap(&mut self) {
        self.executed_group_bitmap.clear();
    }
}
