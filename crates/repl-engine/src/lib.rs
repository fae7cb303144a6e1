//! The applied-effect boundary: everything downstream of event
//! classification funnels through one `apply` call so the Applier,
//! Coordinator and recovery-replay paths share a single choke point.

use async_trait::async_trait;
use repl_schemas::{Event, ReplError};

/// Target storage engine collaborator. Implementations decide what an
/// opaque `Event` means (a row change, a DDL statement, a no-op for
/// control events) and report back using the same transient/fatal/user
/// taxonomy the rest of the core already speaks.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn apply(&self, event: &Event) -> Result<(), ReplError>;

    /// Called once per group commit boundary (`Xid`/DDL-equivalent) so an
    /// engine backed by a real transactional store can commit. No-op for
    /// engines that commit per-statement.
    async fn commit_group(&self) -> Result<(), ReplError> {
        Ok(())
    }

    /// Called on group-level retry: undo whatever `apply` calls happened
    /// since the last `commit_group`.
    async fn rollback_group(&self) -> Result<(), ReplError> {
        Ok(())
    }
}
