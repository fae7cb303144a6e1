//! Test doubles for the replication slave core: a scripted `MasterConn`
//! and an in-memory `StorageEngine`, shared by every scenario test under
//! `tests/`.

mod fake_engine;
mod fake_replica_thread;
mod scripted_conn;

pub use fake_engine::FakeStorageEngine;
pub use fake_replica_thread::FakeReplicaThread;
pub use scripted_conn::ScriptedMasterConn;
