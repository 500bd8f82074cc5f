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

//! Journal replay. Each cycle walks the on-disk entries and, when both
//! sides of a divergence are online, applies the recorded operation to the
//! failed replica. Successful replays delete the entry; failures leave it
//! for the next cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use radio_remote::{RemoteError, RemoteGetOptions, RemotePutOptions, RemoteStatOptions, ReplicaClient};

use crate::entry::{JournalEntry, JournalOp};
use crate::journal::HealSys;
use crate::{HealError, Result};

pub const HEAL_REPLAY_INTERVAL: Duration = Duration::from_secs(15);

const RADIO_TAG_META_KEY: &str = "radio-tag";

/// Resolves the replica ids a journal entry carries back to live clients.
/// Keeping the journal on ids alone avoids holding client handles in
/// persistent state.
pub trait ClientLookup: Send + Sync {
    fn client(&self, id: &str) -> Option<Arc<ReplicaClient>>;

    /// Remote bucket bound to `logical_bucket` on the replica identified by
    /// `id`, used when replaying cross-bucket copies.
    fn remote_bucket(&self, logical_bucket: &str, id: &str) -> Option<String>;
}

impl HealSys {
    /// Runs one replay cycle. Returns the number of entries reconciled and
    /// removed.
    pub async fn replay(&self, lookup: &dyn ClientLookup) -> usize {
        let entries = match self.list().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("unable to scan heal journal: {}", err);
                return 0;
            }
        };

        let mut healed = 0;
        for entry in entries {
            match replay_entry(&entry, lookup).await {
                Ok(()) => {
                    if let Err(err) = self.remove(&entry).await {
                        warn!("unable to remove replayed journal entry: {}", err);
                        continue;
                    }
                    info!(
                        "healed {:?} {}/{} on replica {}",
                        entry.op, entry.bucket, entry.object, entry.err_client_id
                    );
                    healed += 1;
                }
                Err(err) => {
                    debug!(
                        "journal entry for {}/{} on {} not replayable yet: {}",
                        entry.bucket, entry.object, entry.err_client_id, err
                    );
                }
            }
        }

        healed
    }
}

async fn replay_entry(entry: &JournalEntry, lookup: &dyn ClientLookup) -> Result<()> {
    let err_clnt = lookup
        .client(&entry.err_client_id)
        .ok_or_else(|| HealError::ReplicaUnavailable(format!("unknown replica {}", entry.err_client_id)))?;
    if err_clnt.is_offline() {
        return Err(HealError::ReplicaUnavailable(format!("replica {} is offline", err_clnt.id)));
    }

    match entry.op {
        JournalOp::PutObject => replay_put(entry, lookup, &err_clnt).await,
        JournalOp::CopyObject => replay_copy(entry, lookup, &err_clnt).await,
        JournalOp::DeleteObject => replay_delete(entry, &err_clnt).await,
    }
}

fn source_client(entry: &JournalEntry, lookup: &dyn ClientLookup) -> Result<Arc<ReplicaClient>> {
    let src = lookup
        .client(&entry.src_client_id)
        .ok_or_else(|| HealError::ReplicaUnavailable(format!("unknown source replica {}", entry.src_client_id)))?;
    if src.is_offline() {
        return Err(HealError::ReplicaUnavailable(format!("source replica {} is offline", src.id)));
    }
    Ok(src)
}

// The recorded ETag and radio tag make convergence detectable: a target
// that already carries them needs no transfer.
fn already_converged(entry: &JournalEntry, etag: Option<&str>, meta: &HashMap<String, String>) -> bool {
    if let (Some(recorded), Some(actual)) = (entry.etag.as_deref(), etag) {
        if recorded == actual {
            return true;
        }
    }
    if let (Some(recorded), Some(actual)) = (entry.radio_tag.as_deref(), meta.get(RADIO_TAG_META_KEY)) {
        if recorded == actual {
            return true;
        }
    }
    false
}

async fn replay_put(entry: &JournalEntry, lookup: &dyn ClientLookup, err_clnt: &ReplicaClient) -> Result<()> {
    let src_clnt = source_client(entry, lookup)?;

    match err_clnt
        .remote
        .stat_object(&entry.replica_bucket, &entry.object, &RemoteStatOptions::default())
        .await
    {
        Ok(target) => {
            if already_converged(entry, target.etag.as_deref(), &target.user_metadata) {
                return Ok(());
            }
        }
        Err(RemoteError::ObjectNotFound(_)) => {}
        Err(err) => return Err(HealError::Replay(err.to_string())),
    }

    let (reader, src_info) = src_clnt
        .remote
        .get_object(&src_clnt.bucket, &entry.object, &RemoteGetOptions::default())
        .await
        .map_err(|err| HealError::Replay(format!("source read failed: {err}")))?;

    if let (Some(recorded), Some(actual)) = (entry.etag.as_deref(), src_info.etag.as_deref()) {
        if recorded != actual {
            warn!(
                "source etag drifted for {}/{} ({} != {}), healing with current content",
                entry.bucket, entry.object, actual, recorded
            );
        }
    }

    let mut user_metadata = entry.user_meta.clone();
    if user_metadata.is_empty() {
        user_metadata = src_info.user_metadata.clone();
    }

    let opts = RemotePutOptions {
        user_metadata,
        content_type: src_info.content_type.clone(),
        sse: entry.sse.or(src_info.sse),
        ..Default::default()
    };

    err_clnt
        .remote
        .put_object(&entry.replica_bucket, &entry.object, reader, src_info.size, &opts)
        .await
        .map_err(|err| HealError::Replay(format!("target write failed: {err}")))?;

    Ok(())
}

async fn replay_copy(entry: &JournalEntry, lookup: &dyn ClientLookup, err_clnt: &ReplicaClient) -> Result<()> {
    let dst_bucket = entry
        .dst_bucket
        .as_deref()
        .ok_or_else(|| HealError::Replay("copy entry without destination bucket".to_string()))?;
    let dst_object = entry
        .dst_object
        .as_deref()
        .ok_or_else(|| HealError::Replay("copy entry without destination object".to_string()))?;

    let dst_remote_bucket = lookup
        .remote_bucket(dst_bucket, &entry.err_client_id)
        .ok_or_else(|| HealError::Replay(format!("no remote bucket for {dst_bucket} on {}", entry.err_client_id)))?;

    match err_clnt
        .remote
        .stat_object(&dst_remote_bucket, dst_object, &RemoteStatOptions::default())
        .await
    {
        Ok(target) => {
            if already_converged(entry, None, &target.user_metadata) {
                return Ok(());
            }
        }
        Err(RemoteError::ObjectNotFound(_)) => {}
        Err(err) => return Err(HealError::Replay(err.to_string())),
    }

    err_clnt
        .remote
        .copy_object(&entry.replica_bucket, &entry.object, &dst_remote_bucket, dst_object, &HashMap::new())
        .await
        .map_err(|err| HealError::Replay(format!("copy failed: {err}")))?;

    Ok(())
}

async fn replay_delete(entry: &JournalEntry, err_clnt: &ReplicaClient) -> Result<()> {
    match err_clnt.remote.remove_object(&entry.replica_bucket, &entry.object).await {
        Ok(()) => Ok(()),
        Err(RemoteError::ObjectNotFound(_)) => Ok(()),
        Err(err) => Err(HealError::Replay(format!("delete failed: {err}"))),
    }
}

/// Periodic replay until the process token is cancelled.
pub fn spawn_replay_loop(sys: Arc<HealSys>, lookup: Arc<dyn ClientLookup>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEAL_REPLAY_INTERVAL) => {
                    sys.replay(lookup.as_ref()).await;
                }
                _ = cancel.cancelled() => return,
            }
        }
    });
}
