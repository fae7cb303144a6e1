//! Alternative multi-threaded apply mode: a key-conflict FIFO shared by
//! all Workers instead of a fixed per-database hash, with an optional
//! commit-order barrier.

mod commit_order;
mod group;
mod scheduler;

pub use commit_order::CommitOrderManager;
pub use group::{conflicts_with_any, group_keys, Group, WILDCARD_KEY};
pub use scheduler::{DependencyScheduler, SchedulerConfig};
