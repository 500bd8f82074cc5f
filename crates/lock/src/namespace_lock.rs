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

//! Namespace locking over `(volume, path)` resources. Single-node setups
//! lock against an in-process table, clustered setups go through
//! [`DRWMutex`] and the peer lockers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    LockApi,
    drwmutex::{DRWMutex, Options},
    error::Result,
    lrwmutex::LRWMutex,
};

pub type RWLockerImpl = Box<dyn RWLocker + Send + Sync>;

#[async_trait]
pub trait RWLocker {
    async fn get_lock(&mut self, opts: &Options) -> Result<bool>;
    async fn un_lock(&mut self) -> Result<()>;
    async fn get_r_lock(&mut self, opts: &Options) -> Result<bool>;
    async fn un_r_lock(&mut self) -> Result<()>;
    /// Releases whatever this instance currently holds, if anything.
    async fn release(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeldMode {
    Read,
    Write,
}

#[derive(Debug, Default)]
struct NsLock {
    reference: usize,
    lock: Arc<LRWMutex>,
}

/// Reference-counted table of in-process namespace locks.
#[derive(Debug, Default)]
pub struct NsLockMap {
    is_dist: bool,
    lock_map: HashMap<String, NsLock>,
}

impl NsLockMap {
    pub fn new(is_dist: bool) -> Self {
        Self {
            is_dist,
            ..Default::default()
        }
    }

    pub fn is_dist(&self) -> bool {
        self.is_dist
    }
}

fn resource_name(volume: &str, path: &str) -> String {
    format!("{volume}/{path}")
}

async fn ns_lock(
    ns: &Arc<RwLock<NsLockMap>>,
    volume: &str,
    path: &str,
    lock_source: &str,
    ops_id: &str,
    read_lock: bool,
    timeout: Duration,
) -> bool {
    let resource = resource_name(volume, path);

    // Take a reference on the entry, then acquire outside the map guard so
    // other holders can release while this task waits.
    let lock = {
        let mut map = ns.write().await;
        let nslk = map.lock_map.entry(resource.clone()).or_default();
        nslk.reference += 1;
        Arc::clone(&nslk.lock)
    };

    let locked = if read_lock {
        lock.get_r_lock(ops_id, lock_source, &timeout).await
    } else {
        lock.get_lock(ops_id, lock_source, &timeout).await
    };

    if !locked {
        let mut map = ns.write().await;
        if let Some(nslk) = map.lock_map.get_mut(&resource) {
            nslk.reference -= 1;
            if nslk.reference == 0 {
                map.lock_map.remove(&resource);
            }
        }
    }

    locked
}

async fn ns_unlock(ns: &Arc<RwLock<NsLockMap>>, volume: &str, path: &str, read_lock: bool) {
    let resource = resource_name(volume, path);

    let lock = {
        let map = ns.read().await;
        map.lock_map.get(&resource).map(|nslk| Arc::clone(&nslk.lock))
    };
    let Some(lock) = lock else { return };

    if read_lock {
        lock.un_r_lock().await;
    } else {
        lock.un_lock().await;
    }

    let mut map = ns.write().await;
    if let Some(nslk) = map.lock_map.get_mut(&resource) {
        nslk.reference -= 1;
        if nslk.reference == 0 {
            map.lock_map.remove(&resource);
        }
    }
}

/// Handle to an acquired (or acquirable) namespace lock. Dropping the
/// wrapper releases anything still held on a background task; callers on
/// the happy path release explicitly.
pub struct WrapperLocker(pub Arc<RwLock<RWLockerImpl>>);

impl Drop for WrapperLocker {
    fn drop(&mut self) {
        let inner = Arc::clone(&self.0);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = inner.write().await.release().await;
            });
        }
    }
}

pub async fn new_nslock(
    ns: Arc<RwLock<NsLockMap>>,
    owner: String,
    volume: String,
    paths: Vec<String>,
    lockers: Vec<LockApi>,
) -> WrapperLocker {
    if ns.read().await.is_dist {
        let names = paths.iter().map(|path| resource_name(&volume, path)).collect();
        return WrapperLocker(Arc::new(RwLock::new(Box::new(DistLockInstance::new(owner, names, lockers)))));
    }

    WrapperLocker(Arc::new(RwLock::new(Box::new(LocalLockInstance::new(ns, volume, paths)))))
}

struct DistLockInstance {
    lock: DRWMutex,
    ops_id: String,
    held: Option<HeldMode>,
}

impl DistLockInstance {
    fn new(owner: String, names: Vec<String>, lockers: Vec<LockApi>) -> Self {
        Self {
            lock: DRWMutex::new(owner, names, lockers),
            ops_id: Uuid::new_v4().to_string(),
            held: None,
        }
    }
}

#[async_trait]
impl RWLocker for DistLockInstance {
    async fn get_lock(&mut self, opts: &Options) -> Result<bool> {
        let source = String::new();
        let locked = self.lock.get_lock(&self.ops_id, &source, opts).await;
        if locked {
            self.held = Some(HeldMode::Write);
        }
        Ok(locked)
    }

    async fn un_lock(&mut self) -> Result<()> {
        self.lock.un_lock().await;
        self.held = None;
        Ok(())
    }

    async fn get_r_lock(&mut self, opts: &Options) -> Result<bool> {
        let source = String::new();
        let locked = self.lock.get_r_lock(&self.ops_id, &source, opts).await;
        if locked {
            self.held = Some(HeldMode::Read);
        }
        Ok(locked)
    }

    async fn un_r_lock(&mut self) -> Result<()> {
        self.lock.un_r_lock().await;
        self.held = None;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        match self.held {
            Some(HeldMode::Write) => self.un_lock().await,
            Some(HeldMode::Read) => self.un_r_lock().await,
            None => Ok(()),
        }
    }
}

struct LocalLockInstance {
    ns: Arc<RwLock<NsLockMap>>,
    volume: String,
    paths: Vec<String>,
    ops_id: String,
    held: Option<HeldMode>,
}

impl LocalLockInstance {
    fn new(ns: Arc<RwLock<NsLockMap>>, volume: String, paths: Vec<String>) -> Self {
        Self {
            ns,
            volume,
            paths,
            ops_id: Uuid::new_v4().to_string(),
            held: None,
        }
    }

    async fn acquire(&mut self, opts: &Options, read_lock: bool) -> Result<bool> {
        let source = String::new();
        let mut success = vec![false; self.paths.len()];
        for (idx, path) in self.paths.iter().enumerate() {
            if !ns_lock(&self.ns, &self.volume, path, &source, &self.ops_id, read_lock, opts.timeout).await {
                for (i, ok) in success.iter().enumerate() {
                    if *ok {
                        ns_unlock(&self.ns, &self.volume, &self.paths[i], read_lock).await;
                    }
                }
                return Ok(false);
            }
            success[idx] = true;
        }
        self.held = Some(if read_lock { HeldMode::Read } else { HeldMode::Write });
        Ok(true)
    }

    async fn relinquish(&mut self, read_lock: bool) {
        for path in self.paths.iter() {
            ns_unlock(&self.ns, &self.volume, path, read_lock).await;
        }
        self.held = None;
    }
}

#[async_trait]
impl RWLocker for LocalLockInstance {
    async fn get_lock(&mut self, opts: &Options) -> Result<bool> {
        self.acquire(opts, false).await
    }

    async fn un_lock(&mut self) -> Result<()> {
        self.relinquish(false).await;
        Ok(())
    }

    async fn get_r_lock(&mut self, opts: &Options) -> Result<bool> {
        self.acquire(opts, true).await
    }

    async fn un_r_lock(&mut self) -> Result<()> {
        self.relinquish(true).await;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        match self.held {
            Some(HeldMode::Write) => self.un_lock().await,
            Some(HeldMode::Read) => self.un_r_lock().await,
            None => Ok(()),
        }
    }
}
