//! Single-threaded SQL-thread equivalent: reads from the relay log and
//! applies through a `StorageEngine`, one event at a time.

mod applier;

pub use applier::{Applier, ApplierConfig};
