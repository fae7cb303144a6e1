//! Multi-threaded apply: the Coordinator partitions transaction groups
//! across a Worker pool, tracks in-flight groups in a GAQ, and checkpoints
//! the low-water mark back through `PositionStore`.

mod coordinator;
mod gaq;
mod partitioning;
mod recovery;
mod worker;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use gaq::{Gaq, GaqEntry};
pub use partitioning::{choose_worker, worker_for_db, GroupDbTracker, PartitionMode};
pub use recovery::{bit_is_set, merge_worker_bitmaps};
pub use worker::{run_dependency_worker, run_worker, WorkerHandle, WorkerJob};
