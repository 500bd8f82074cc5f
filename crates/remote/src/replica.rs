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

use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::RemoteApi;
use crate::error::RemoteError;
use crate::sdk::SdkRemote;
use crate::RemoteConfig;

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

const STARTUP_PROBE_ATTEMPTS: usize = 3;
const SERVER_NOT_INITIALIZED: &str = "XMinioServerNotInitialized";

/// Stable identity of a replica: lowercase hex SHA-256 over the canonical
/// serialization of its connection tuple. Identical tuples produce
/// identical ids on every peer.
pub fn client_id(cfg: &RemoteConfig) -> String {
    match serde_json::to_vec(cfg) {
        Ok(bytes) => {
            let mut hash = Sha256::new();
            hash.update(&bytes);
            hex::encode(hash.finalize())
        }
        Err(_) => format!("{}{}", cfg.bucket, cfg.endpoint),
    }
}

/// One remote backend bound to its remote bucket, replica id and health
/// flag. The flag is written only by the health checker and read
/// lock-free by the pipeline.
pub struct ReplicaClient {
    pub remote: Arc<dyn RemoteApi>,
    pub bucket: String,
    pub id: String,
    online: AtomicU32,
}

impl std::fmt::Debug for ReplicaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaClient")
            .field("bucket", &self.bucket)
            .field("id", &self.id)
            .field("online", &self.online.load(Ordering::Relaxed))
            .finish()
    }
}

impl ReplicaClient {
    pub fn new(remote: Arc<dyn RemoteApi>, bucket: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            remote,
            bucket: bucket.into(),
            id: id.into(),
            online: AtomicU32::new(1),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.online.load(Ordering::Relaxed) == 0
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(u32::from(online), Ordering::Relaxed);
    }
}

/// Connects one replica, probing the remote bucket the way the gateway
/// tolerates slow-starting backends: a server that reports it is not yet
/// initialized is retried once per second, any other failure is fatal
/// unless the probe already burned its retry budget.
pub async fn connect(cfg: &RemoteConfig) -> Result<ReplicaClient, RemoteError> {
    let remote = SdkRemote::new(cfg)?;

    let mut attempts = 0;
    loop {
        match remote.bucket_exists(&cfg.bucket).await {
            Ok(_) => break,
            Err(err) => {
                if err.code() == Some(SERVER_NOT_INITIALIZED) {
                    warn!("remote {} not initialized yet: {}", cfg.endpoint, err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    attempts += 1;
                    continue;
                }
                if attempts < STARTUP_PROBE_ATTEMPTS {
                    return Err(err);
                }
                break;
            }
        }
    }

    Ok(ReplicaClient::new(Arc::new(remote), cfg.bucket.clone(), client_id(cfg)))
}

/// Builds the ordered replica clients of one mirror binding.
pub async fn new_replica_clients(cfgs: &[RemoteConfig]) -> Result<Vec<Arc<ReplicaClient>>, RemoteError> {
    let mut clients = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        clients.push(Arc::new(connect(cfg).await?));
    }
    Ok(clients)
}

/// Probes every replica in parallel on a fixed interval and flips the
/// online flags. Runs until the process token is cancelled.
pub fn spawn_health_checker(clients: Vec<Arc<ReplicaClient>>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            let probes = clients.iter().map(|clnt| {
                let clnt = Arc::clone(clnt);
                async move { clnt.remote.bucket_exists(&clnt.bucket).await }
            });

            for (clnt, result) in clients.iter().zip(join_all(probes).await) {
                match result {
                    Ok(_) => clnt.set_online(true),
                    Err(err) => {
                        if !clnt.is_offline() {
                            info!("replica {} went offline: {}", clnt.id, err);
                        }
                        clnt.set_online(false);
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(HEALTH_CHECK_INTERVAL) => {}
                _ = cancel.cancelled() => return,
            }
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_id_is_stable_and_tuple_sensitive() {
        let cfg = RemoteConfig {
            bucket: "data".to_string(),
            endpoint: "http://replica-1:9000".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            session_token: String::new(),
        };

        let id = client_id(&cfg);
        assert_eq!(id, client_id(&cfg.clone()));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let mut other = cfg.clone();
        other.endpoint = "http://replica-2:9000".to_string();
        assert_ne!(id, client_id(&other));
    }
}
