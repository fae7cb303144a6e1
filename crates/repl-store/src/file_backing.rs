use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::backing::{LoadOutcome, PositionBacking};
use crate::record::PersistedState;

/// JSON-file backed `PositionBacking`. Writes go to a sibling `.tmp` file
/// and are `rename`d over the target so a reader never observes a partial
/// write; POSIX rename within the same directory is atomic.
pub struct FileBacking {
    path: PathBuf,
}

impl FileBacking {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[async_trait]
impl PositionBacking for FileBacking {
    async fn load(&self) -> Result<LoadOutcome> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::NotFound),
            Err(e) => return Err(e).context("read position file"),
        };
        match serde_json::from_slice::<PersistedState>(&bytes) {
            Ok(state) => Ok(LoadOutcome::Found(state)),
            Err(e) => Ok(LoadOutcome::Corrupt(e.to_string())),
        }
    }

    async fn save(&self, state: &PersistedState, force: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {parent:?}"))?;
        }
        let tmp = self.tmp_path();
        let bytes = serde_json::to_vec_pretty(state).context("serialize position state")?;
        fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("write {tmp:?}"))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {tmp:?} -> {:?}", self.path))?;

        if force {
            if let Some(parent) = self.path.parent() {
                let dir = std::fs::File::open(parent).with_context(|| format!("open dir {parent:?}"))?;
                dir.sync_all().context("fsync position dir")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repl_schemas::Coordinate;

    #[tokio::test]
    async fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backing = FileBacking::new(dir.path().join("position.json"));
        assert_eq!(backing.load().await.unwrap(), LoadOutcome::NotFound);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backing = FileBacking::new(dir.path().join("position.json"));
        let state = PersistedState::new(
            Coordinate::new("relay-bin.000003".into(), 194),
            Coordinate::new("relay-bin.000003".into(), 194),
        );
        backing.save(&state, true).await.unwrap();
        match backing.load().await.unwrap() {
            LoadOutcome::Found(loaded) => assert_eq!(loaded, state),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_file_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");
        tokio::fs::write(&path, b"{not valid json").await.unwrap();
        let backing = FileBacking::new(path);
        match backing.load().await.unwrap() {
            LoadOutcome::Corrupt(_) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }
}
