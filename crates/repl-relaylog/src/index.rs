use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Line-oriented index file: one relay-log file name per line, in the
/// order the files were created. Rewritten wholesale on purge, appended
/// to on rotate.
pub struct RelayLogIndex {
    path: PathBuf,
}

impl RelayLogIndex {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub async fn load(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(s) => Ok(s.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("read relay log index {:?}", self.path)),
        }
    }

    pub async fn append(&self, file_name: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.ok();
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open relay log index {:?}", self.path))?;
        f.write_all(file_name.as_bytes()).await?;
        f.write_all(b"\n").await?;
        f.flush().await?;
        Ok(())
    }

    pub async fn rewrite(&self, entries: &[String]) -> Result<()> {
        let tmp = self.path.with_extension("idx.tmp");
        let body = entries.join("\n") + if entries.is_empty() { "" } else { "\n" };
        fs::write(&tmp, body.as_bytes()).await.with_context(|| format!("write {tmp:?}"))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {tmp:?} -> {:?}", self.path))?;
        Ok(())
    }
}
