use async_trait::async_trait;

use crate::record::PersistedState;

/// Result of a `PositionStore::load` call. Distinguishes "nothing has ever
/// been persisted" (fresh start, coordinator reads the relay log header)
/// from "something is there but unreadable" (a restart must refuse to run
/// rather than guess a position).
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Found(PersistedState),
    NotFound,
    Corrupt(String),
}

/// Backing storage for the persisted cursor. `FileBacking` and
/// `TableBacking` are the two implementations; both must guarantee that a
/// crash mid-write never leaves `load` reading a half-written record.
#[async_trait]
pub trait PositionBacking: Send + Sync {
    async fn load(&self) -> anyhow::Result<LoadOutcome>;

    /// `force` requests an additional fsync of the containing directory
    /// (or, for `TableBacking`, is a no-op since the caller's transaction
    /// commit already provides durability).
    async fn save(&self, state: &PersistedState, force: bool) -> anyhow::Result<()>;
}
