use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use repl_schemas::{Coordinate, Event, BIN_LOG_HEADER_SIZE};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, Notify, RwLock};

use crate::index::RelayLogIndex;

const HEADER_BYTES: [u8; BIN_LOG_HEADER_SIZE as usize] = *b"rpl\0";

struct WriteState {
    current_file: String,
    offset: u64,
    handle: File,
}

/// Append-only relay log: a sequence of `<base>.NNNNNN` files plus one
/// index file naming them in creation order. One appender at a time
/// (the Receiver), any number of readers (the Applier and recovery scans).
pub struct RelayLog {
    dir: PathBuf,
    base_name: String,
    index: RelayLogIndex,
    /// Cached copy of the index contents; readers consult this and the
    /// writer keeps it current on rotate/purge.
    entries: RwLock<Vec<String>>,
    write_state: Mutex<Option<WriteState>>,
    /// Held exclusively only while `rotate` swaps the current file; readers
    /// take a brief read guard when they cross a file boundary so they
    /// never observe the index mid-update.
    log_lock: RwLock<()>,
    notify: Notify,
    ignore_space_limit: AtomicBool,
    space_limit: u64,
}

impl RelayLog {
    pub async fn open(dir: impl AsRef<Path>, base_name: impl Into<String>, space_limit: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.with_context(|| format!("create_dir_all {dir:?}"))?;
        let base_name = base_name.into();
        let index_path = dir.join(format!("{base_name}.index"));
        let index = RelayLogIndex::new(&index_path);
        let entries = index.load().await?;

        let log = Self {
            dir,
            base_name,
            index,
            entries: RwLock::new(entries),
            write_state: Mutex::new(None),
            log_lock: RwLock::new(()),
            notify: Notify::new(),
            ignore_space_limit: AtomicBool::new(false),
            space_limit,
        };

        if log.entries.read().await.is_empty() {
            log.rotate().await?;
        } else {
            log.reopen_tail_for_write().await?;
        }

        Ok(log)
    }

    fn next_file_name(&self, generation: u64) -> String {
        format!("{}.{:06}", self.base_name, generation)
    }

    async fn reopen_tail_for_write(&self) -> Result<()> {
        let entries = self.entries.read().await;
        let tail = entries.last().cloned().context("relay log index is empty")?;
        drop(entries);
        let path = self.dir.join(&tail);
        let meta = fs::metadata(&path).await.with_context(|| format!("stat {path:?}"))?;
        let handle = OpenOptions::new().append(true).open(&path).await.with_context(|| format!("open {path:?}"))?;
        *self.write_state.lock().await = Some(WriteState {
            current_file: tail,
            offset: meta.len(),
            handle,
        });
        Ok(())
    }

    /// Ask whether disk space used by this log exceeds the configured
    /// limit. Callers that can't free space should set
    /// `set_ignore_space_limit(true)` to unblock the appender.
    pub fn set_ignore_space_limit(&self, ignore: bool) {
        self.ignore_space_limit.store(ignore, Ordering::SeqCst);
    }

    pub async fn space_used(&self) -> Result<u64> {
        let entries = self.entries.read().await;
        let mut total = 0u64;
        for name in entries.iter() {
            let path = self.dir.join(name);
            if let Ok(meta) = fs::metadata(&path).await {
                total += meta.len();
            }
        }
        Ok(total)
    }

    /// Append one event to the current file, enforcing the space-limit
    /// interlock one event at a time: if the log is over budget and
    /// `ignore_space_limit` is not set, this waits for either to change.
    pub async fn append(&self, event: &Event) -> Result<Coordinate> {
        loop {
            if self.space_limit > 0 && !self.ignore_space_limit.load(Ordering::SeqCst) {
                if self.space_used().await? >= self.space_limit {
                    let notified = self.notify.notified();
                    tokio::select! {
                        _ = notified => continue,
                        _ = tokio::time::sleep(Duration::from_millis(200)) => continue,
                    }
                }
            }
            break;
        }

        let line = serde_json::to_vec(event).context("serialize relay log event")?;
        let mut guard = self.write_state.lock().await;
        let ws = guard.as_mut().context("relay log has no open write file")?;
        ws.handle.write_all(&line).await.context("write relay log event")?;
        ws.handle.write_all(b"\n").await.context("write relay log newline")?;
        ws.offset += line.len() as u64 + 1;
        let coord = Coordinate::new(ws.current_file.clone(), ws.offset);
        drop(guard);
        self.notify.notify_waiters();
        Ok(coord)
    }

    /// Close the current file and open the next generation, recording a
    /// synthetic Rotate boundary in the index. Returns the header
    /// coordinate of the new file.
    pub async fn rotate(&self) -> Result<Coordinate> {
        let _exclusive = self.log_lock.write().await;

        let generation = {
            let entries = self.entries.read().await;
            entries
                .last()
                .and_then(|f| Coordinate::new(f.clone(), 0).file_generation())
                .map(|g| g + 1)
                .unwrap_or(1)
        };
        let new_name = self.next_file_name(generation);
        let path = self.dir.join(&new_name);

        let mut handle = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .with_context(|| format!("create relay log file {path:?}"))?;
        handle.write_all(&HEADER_BYTES).await.context("write relay log header")?;
        handle.flush().await.ok();

        self.index.append(&new_name).await?;
        self.entries.write().await.push(new_name.clone());

        *self.write_state.lock().await = Some(WriteState {
            current_file: new_name.clone(),
            offset: BIN_LOG_HEADER_SIZE,
            handle,
        });

        self.notify.notify_waiters();
        Ok(Coordinate::header_of(new_name))
    }

    pub async fn flush_and_sync(&self) -> Result<()> {
        let mut guard = self.write_state.lock().await;
        if let Some(ws) = guard.as_mut() {
            ws.handle.flush().await.context("flush relay log")?;
            ws.handle.sync_data().await.context("fsync relay log")?;
        }
        Ok(())
    }

    /// Delete every file strictly before `up_to.file_name` in index order.
    /// The caller (Coordinator checkpoint task) is responsible for never
    /// purging past what has actually been committed.
    pub async fn purge_until(&self, up_to: &Coordinate) -> Result<()> {
        let _exclusive = self.log_lock.write().await;
        let mut entries = self.entries.write().await;
        let keep_from = entries.iter().position(|f| f == &up_to.file_name).unwrap_or(0);
        for stale in entries.drain(..keep_from) {
            let path = self.dir.join(&stale);
            fs::remove_file(&path).await.ok();
        }
        self.index.rewrite(&entries).await?;
        Ok(())
    }

    /// `RESET SLAVE ALL`'s relay-log half: delete every file this log
    /// knows about and start fresh at generation 1. Caller is responsible
    /// for having both Receiver and Applier stopped first.
    pub async fn reset(&self) -> Result<Coordinate> {
        let _exclusive = self.log_lock.write().await;
        *self.write_state.lock().await = None;
        let mut entries = self.entries.write().await;
        for stale in entries.drain(..) {
            let path = self.dir.join(&stale);
            fs::remove_file(&path).await.ok();
        }
        self.index.rewrite(&entries).await?;
        drop(entries);
        drop(_exclusive);
        self.rotate().await
    }

    pub async fn open_for_read(&self, from: Coordinate) -> Result<RelayLogReader> {
        let path = self.dir.join(&from.file_name);
        let mut file = File::open(&path).await.with_context(|| format!("open {path:?} for read"))?;
        file.seek(std::io::SeekFrom::Start(from.offset)).await?;
        Ok(RelayLogReader {
            file_name: from.file_name,
            offset: from.offset,
            reader: BufReader::new(file),
        })
    }

    /// Read the next event, advancing `reader`. Returns `Ok(None)` if no
    /// new event is available right now; callers loop and re-check their
    /// own abort flag between calls.
    pub async fn read_next(&self, reader: &mut RelayLogReader) -> Result<Option<Event>> {
        let mut line = String::new();
        let n = reader.reader.read_line(&mut line).await.context("read relay log line")?;
        if n > 0 {
            reader.offset += n as u64;
            let event: Event = serde_json::from_str(line.trim_end()).context("parse relay log event")?;
            return Ok(Some(event));
        }

        // Hit EOF on the current file: see if a newer file exists.
        let _guard = self.log_lock.read().await;
        let entries = self.entries.read().await;
        let pos = entries.iter().position(|f| f == &reader.file_name);
        let next = pos.and_then(|i| entries.get(i + 1)).cloned();
        drop(entries);
        drop(_guard);

        let Some(next_name) = next else {
            return Ok(None);
        };
        let path = self.dir.join(&next_name);
        let file = File::open(&path).await.with_context(|| format!("open {path:?} for read"))?;
        reader.file_name = next_name;
        reader.offset = BIN_LOG_HEADER_SIZE;
        reader.reader = BufReader::new(file);
        reader.reader.seek(std::io::SeekFrom::Start(BIN_LOG_HEADER_SIZE)).await?;
        self.read_next(reader).await
    }

    /// Wait up to a short interval for new data to arrive, for callers
    /// that got `Ok(None)` from `read_next` and have nothing else to do.
    pub async fn wait_for_data(&self) {
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }

    pub fn current_base_name(&self) -> &str {
        &self.base_name
    }

    pub async fn current_write_coordinate(&self) -> Result<Coordinate> {
        let guard = self.write_state.lock().await;
        let ws = guard.as_ref().context("relay log has no open write file")?;
        Ok(Coordinate::new(ws.current_file.clone(), ws.offset))
    }
}

pub struct RelayLogReader {
    file_name: String,
    offset: u64,
    reader: BufReader<File>,
}

impl RelayLogReader {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.file_name.clone(), self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repl_schemas::EventPayload;

    fn dummy_event(offset_hint: u64) -> Event {
        Event {
            server_id: 7,
            timestamp: Utc::now(),
            coordinate: Coordinate::new("ignored".into(), offset_hint),
            payload_len: 0,
            payload: EventPayload::Xid { xid: offset_hint },
            checksum: None,
        }
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = RelayLog::open(dir.path(), "relay-bin", 0).await.unwrap();
        let header = log.current_write_coordinate().await.unwrap();

        log.append(&dummy_event(1)).await.unwrap();
        log.append(&dummy_event(2)).await.unwrap();

        let mut reader = log.open_for_read(header).await.unwrap();
        let e1 = log.read_next(&mut reader).await.unwrap().unwrap();
        let e2 = log.read_next(&mut reader).await.unwrap().unwrap();
        assert_eq!(e1.payload, EventPayload::Xid { xid: 1 });
        assert_eq!(e2.payload, EventPayload::Xid { xid: 2 });
        assert!(log.read_next(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_crosses_file_boundary_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let log = RelayLog::open(dir.path(), "relay-bin", 0).await.unwrap();
        let header = log.current_write_coordinate().await.unwrap();
        log.append(&dummy_event(1)).await.unwrap();
        log.rotate().await.unwrap();
        log.append(&dummy_event(2)).await.unwrap();

        let mut reader = log.open_for_read(header).await.unwrap();
        let e1 = log.read_next(&mut reader).await.unwrap().unwrap();
        let e2 = log.read_next(&mut reader).await.unwrap().unwrap();
        assert_eq!(e1.payload, EventPayload::Xid { xid: 1 });
        assert_eq!(e2.payload, EventPayload::Xid { xid: 2 });
        assert_ne!(reader.file_name, header.file_name);
    }

    #[tokio::test]
    async fn purge_until_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = RelayLog::open(dir.path(), "relay-bin", 0).await.unwrap();
        let first = log.current_write_coordinate().await.unwrap();
        log.rotate().await.unwrap();
        let second = log.current_write_coordinate().await.unwrap();
        log.rotate().await.unwrap();

        let first_path = dir.path().join(&first.file_name);
        assert!(first_path.exists());
        log.purge_until(&second).await.unwrap();
        assert!(!first_path.exists());
    }
}
