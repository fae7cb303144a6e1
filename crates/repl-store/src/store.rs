use std::sync::Arc;

use anyhow::Result;

use crate::backing::{LoadOutcome, PositionBacking};
use crate::record::PersistedState;

/// Thin, backing-agnostic façade the Receiver/Coordinator call through.
/// Which `PositionBacking` is plugged in decides whether the cursor lives
/// in a file or participates in the target engine's own transactions.
#[derive(Clone)]
pub struct PositionStore {
    backing: Arc<dyn PositionBacking>,
}

impl PositionStore {
    pub fn new(backing: Arc<dyn PositionBacking>) -> Self {
        Self { backing }
    }

    pub async fn load(&self) -> Result<LoadOutcome> {
        self.backing.load().await
    }

    pub async fn save(&self, state: &PersistedState, force: bool) -> Result<()> {
        self.backing.save(state, force).await
    }
}
