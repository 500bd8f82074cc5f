// Copyright 2025 Radio Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::entry::JournalEntry;
use crate::{HealError, Result};

// Submissions must never block the request path; the queue is wide and
// overflow is dropped with a warning. A later write to the same object
// re-journals while the divergence persists.
const SUBMIT_QUEUE_DEPTH: usize = 1024;

/// File name of the journal record for one (replica bucket, logical
/// bucket, object) triple. The triple is hashed so any object name maps to
/// a flat, filesystem-safe layout; the latest entry for a triple always
/// overwrites the previous one.
pub fn journal_file_name(replica_bucket: &str, bucket: &str, object: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(replica_bucket.as_bytes());
    hash.update([0u8]);
    hash.update(bucket.as_bytes());
    hash.update([0u8]);
    hash.update(object.as_bytes());
    format!("{}.json", hex::encode(hash.finalize()))
}

/// Journal handle: asynchronous submission plus the read/remove surface
/// used by the read path and the replayer.
pub struct HealSys {
    dir: PathBuf,
    tx: mpsc::Sender<JournalEntry>,
}

impl HealSys {
    /// Starts the journal consumer; entries submitted through the returned
    /// handle drain to disk until the process token is cancelled. The queue
    /// keeps draining after cancellation until it is empty.
    pub fn new(dir: impl Into<PathBuf>, cancel: CancellationToken) -> std::sync::Arc<Self> {
        let dir = dir.into();
        let (tx, rx) = mpsc::channel(SUBMIT_QUEUE_DEPTH);
        let sys = std::sync::Arc::new(Self { dir: dir.clone(), tx });
        tokio::spawn(drain(dir, rx, cancel));
        sys
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enqueues a divergence record. Never blocks; a full queue drops the
    /// entry with a warning.
    pub fn send(&self, entry: JournalEntry) {
        if let Err(err) = self.tx.try_send(entry) {
            warn!("heal journal submission dropped: {}", err);
        }
    }

    pub fn entry_path(&self, replica_bucket: &str, bucket: &str, object: &str) -> PathBuf {
        self.dir.join(journal_file_name(replica_bucket, bucket, object))
    }

    /// Latest recorded divergence for the triple, if any.
    pub async fn read_latest(&self, replica_bucket: &str, bucket: &str, object: &str) -> Option<JournalEntry> {
        let path = self.entry_path(replica_bucket, bucket, object);
        let data = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&data) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("unreadable journal entry {:?}: {}", path, err);
                None
            }
        }
    }

    pub async fn remove(&self, entry: &JournalEntry) -> Result<()> {
        let path = self.entry_path(&entry.replica_bucket, &entry.bucket, &entry.object);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(HealError::Io(err)),
        }
    }

    /// Every entry currently on disk, in directory order.
    pub async fn list(&self) -> Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(HealError::Io(err)),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let data = tokio::fs::read(&path).await?;
                match serde_json::from_slice(&data) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => warn!("skipping unreadable journal entry {:?}: {}", path, err),
                }
            }
        }

        Ok(entries)
    }
}

async fn drain(dir: PathBuf, mut rx: mpsc::Receiver<JournalEntry>, cancel: CancellationToken) {
    loop {
        let entry = tokio::select! {
            entry = rx.recv() => entry,
            _ = cancel.cancelled() => {
                // Flush whatever is already queued, then stop.
                rx.close();
                while let Some(entry) = rx.recv().await {
                    write_entry(&dir, &entry).await;
                }
                return;
            }
        };

        match entry {
            Some(entry) => write_entry(&dir, &entry).await,
            None => return,
        }
    }
}

async fn write_entry(dir: &Path, entry: &JournalEntry) {
    if let Err(err) = try_write_entry(dir, entry).await {
        // The client already holds an acknowledgment from the surviving
        // replica; a journal write failure is logged, never surfaced.
        warn!(
            "unable to persist journal entry for {}/{} on {}: {}",
            entry.bucket, entry.object, entry.err_client_id, err
        );
    } else {
        debug!(
            "journaled {:?} for {}/{} against {}",
            entry.op, entry.bucket, entry.object, entry.err_client_id
        );
    }
}

async fn try_write_entry(dir: &Path, entry: &JournalEntry) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let name = journal_file_name(&entry.replica_bucket, &entry.bucket, &entry.object);
    let tmp = dir.join(format!("{name}.tmp"));
    let path = dir.join(name);

    let data = serde_json::to_vec_pretty(entry)?;
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, &path).await?;

    Ok(())
}
