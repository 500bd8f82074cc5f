#![allow(dead_code)]
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

//! Distributed read/write locking over `(bucket, object)` resources.
//!
//! Every peer runs a [`LocalLocker`] lock table reachable over the lock
//! RPC. An acquirer sends the lock request to all peers and holds the lock
//! once a strict majority granted it; grants are leased and must be
//! refreshed before [`LOCK_LEASE_TTL`] or the peer reclaims them.

use async_trait::async_trait;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::RwLock;

pub mod drwmutex;
pub mod error;
pub mod local_locker;
pub mod lock_args;
pub mod lrwmutex;
pub mod namespace_lock;
pub mod remote_client;
pub mod rpc;

pub use error::{LockError, Result};
use local_locker::LocalLocker;
use lock_args::LockArgs;
use remote_client::RemoteClient;

/// How long a granted lease stays valid without a refresh.
pub const LOCK_LEASE_TTL: Duration = Duration::from_secs(120);

/// How often lock holders refresh their grants.
pub const LOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// How often each peer sweeps its table for expired leases.
pub const LOCK_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// The lock table this process serves to itself and to its peers.
pub static GLOBAL_LOCAL_SERVER: LazyLock<Arc<RwLock<LocalLocker>>> =
    LazyLock::new(|| Arc::new(RwLock::new(LocalLocker::new())));

#[async_trait]
pub trait Locker {
    async fn lock(&mut self, args: &LockArgs) -> Result<bool>;
    async fn unlock(&mut self, args: &LockArgs) -> Result<bool>;
    async fn rlock(&mut self, args: &LockArgs) -> Result<bool>;
    async fn runlock(&mut self, args: &LockArgs) -> Result<bool>;
    async fn refresh(&mut self, args: &LockArgs) -> Result<bool>;
    async fn force_unlock(&mut self, args: &LockArgs) -> Result<bool>;
    async fn is_online(&self) -> bool;
    async fn is_local(&self) -> bool;
}

/// A locker endpoint: either this process's own table or a peer.
#[derive(Debug, Clone)]
pub enum LockApi {
    Local,
    Remote(RemoteClient),
}

#[async_trait]
impl Locker for LockApi {
    async fn lock(&mut self, args: &LockArgs) -> Result<bool> {
        match self {
            LockApi::Local => GLOBAL_LOCAL_SERVER.write().await.lock(args),
            LockApi::Remote(r) => r.lock(args).await,
        }
    }

    async fn unlock(&mut self, args: &LockArgs) -> Result<bool> {
        match self {
            LockApi::Local => GLOBAL_LOCAL_SERVER.write().await.unlock(args),
            LockApi::Remote(r) => r.unlock(args).await,
        }
    }

    async fn rlock(&mut self, args: &LockArgs) -> Result<bool> {
        match self {
            LockApi::Local => GLOBAL_LOCAL_SERVER.write().await.rlock(args),
            LockApi::Remote(r) => r.rlock(args).await,
        }
    }

    async fn runlock(&mut self, args: &LockArgs) -> Result<bool> {
        match self {
            LockApi::Local => GLOBAL_LOCAL_SERVER.write().await.runlock(args),
            LockApi::Remote(r) => r.runlock(args).await,
        }
    }

    async fn refresh(&mut self, args: &LockArgs) -> Result<bool> {
        match self {
            LockApi::Local => GLOBAL_LOCAL_SERVER.write().await.refresh(args),
            LockApi::Remote(r) => r.refresh(args).await,
        }
    }

    async fn force_unlock(&mut self, args: &LockArgs) -> Result<bool> {
        match self {
            LockApi::Local => GLOBAL_LOCAL_SERVER.write().await.force_unlock(args),
            LockApi::Remote(r) => r.force_unlock(args).await,
        }
    }

    async fn is_online(&self) -> bool {
        match self {
            LockApi::Local => true,
            LockApi::Remote(r) => r.is_online().await,
        }
    }

    async fn is_local(&self) -> bool {
        matches!(self, LockApi::Local)
    }
}

pub fn new_lock_api(is_local: bool, url: Option<url::Url>, token: &str) -> Result<LockApi> {
    if is_local {
        return Ok(LockApi::Local);
    }
    let url = url.ok_or_else(|| LockError::Config("remote locker requires a peer url".to_string()))?;
    Ok(LockApi::Remote(RemoteClient::new(url, token)))
}

/// Reclaims expired leases from the process-local lock table until cancelled.
pub fn spawn_lease_maintenance(cancel: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LOCK_MAINTENANCE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = GLOBAL_LOCAL_SERVER.write().await.expire_old_locks(LOCK_LEASE_TTL);
                    if expired > 0 {
                        tracing::warn!("reclaimed {} expired lock leases", expired);
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    });
}
