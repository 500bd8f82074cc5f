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

//! Read/write mutex held across every lock peer. An acquisition asks all
//! peers and succeeds once a strict majority granted; anything less is
//! rolled back and retried until the caller deadline expires. Held locks
//! are refreshed in the background so peers do not reclaim the lease.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{LOCK_REFRESH_INTERVAL, LockApi, Locker, lock_args::LockArgs};

const LOCK_RETRY_MIN_INTERVAL: Duration = Duration::from_millis(250);
const RELEASE_ALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct DRWMutex {
    owner: String,
    names: Vec<String>,
    write_locks: Vec<String>,
    read_locks: Vec<String>,
    lockers: Vec<LockApi>,
    cancel_refresh: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_interval: LOCK_RETRY_MIN_INTERVAL,
        }
    }
}

fn is_locked(uid: &str) -> bool {
    !uid.is_empty()
}

fn count_granted(locks: &[String]) -> usize {
    locks.iter().filter(|uid| is_locked(uid)).count()
}

impl DRWMutex {
    pub fn new(owner: String, names: Vec<String>, lockers: Vec<LockApi>) -> Self {
        let mut names = names;
        names.sort();
        Self {
            owner,
            names,
            write_locks: Vec::new(),
            read_locks: Vec::new(),
            lockers,
            cancel_refresh: None,
        }
    }

    // Strictly more than half of the peers must grant. A single peer
    // degrades to quorum 1.
    fn quorum(&self) -> usize {
        self.lockers.len() / 2 + 1
    }

    fn is_locked(&self) -> bool {
        self.write_locks.iter().any(|uid| is_locked(uid))
    }

    fn is_r_locked(&self) -> bool {
        self.read_locks.iter().any(|uid| is_locked(uid))
    }

    pub async fn get_lock(&mut self, id: &str, source: &str, opts: &Options) -> bool {
        let is_read_lock = false;
        self.lock_blocking(id, source, is_read_lock, opts).await
    }

    pub async fn get_r_lock(&mut self, id: &str, source: &str, opts: &Options) -> bool {
        let is_read_lock = true;
        self.lock_blocking(id, source, is_read_lock, opts).await
    }

    async fn lock_blocking(&mut self, id: &str, source: &str, is_read_lock: bool, opts: &Options) -> bool {
        let quorum = self.quorum();
        debug!(
            "lock_blocking {}/{} for {:?}: read({}), quorum {}, peers {}",
            id,
            source,
            self.names,
            is_read_lock,
            quorum,
            self.lockers.len()
        );

        let start = Instant::now();
        let mut locks = vec![String::new(); self.lockers.len()];

        loop {
            if self.inner_lock(&mut locks, id, source, is_read_lock, quorum).await {
                if is_read_lock {
                    self.read_locks = locks;
                } else {
                    self.write_locks = locks;
                }
                info!("lock_blocking {}/{} for {:?}: granted", id, source, self.names);
                self.start_refresh(id, quorum);
                return true;
            }

            if start.elapsed() >= opts.timeout {
                return false;
            }

            let jitter = {
                let mut rng = rand::rng();
                rng.random_range(10..=50)
            };
            sleep(opts.retry_interval.max(LOCK_RETRY_MIN_INTERVAL) + Duration::from_millis(jitter)).await;
        }
    }

    async fn inner_lock(&mut self, locks: &mut [String], id: &str, source: &str, is_read_lock: bool, quorum: usize) -> bool {
        locks.iter_mut().for_each(|uid| uid.clear());

        let args = LockArgs {
            uid: id.to_string(),
            resources: self.names.clone(),
            owner: self.owner.clone(),
            source: source.to_string(),
            quorum,
        };

        for (index, locker) in self.lockers.iter_mut().enumerate() {
            let granted = if is_read_lock {
                locker.rlock(&args).await
            } else {
                locker.lock(&args).await
            };
            match granted {
                Ok(true) => locks[index] = id.to_string(),
                Ok(false) => {}
                Err(err) => {
                    warn!("lock call failed with {} for {} at peer {}", err, args, index);
                }
            }
        }

        let quorum_locked = count_granted(locks) >= quorum;
        if !quorum_locked {
            debug!("unable to acquire lock in quorum, {}", args);
            if !self.release_all(locks, is_read_lock).await {
                info!("unable to release partial grants, they will expire with the lease, {}", args);
            }
        }

        quorum_locked
    }

    fn start_refresh(&mut self, id: &str, quorum: usize) {
        let cancel = CancellationToken::new();
        self.cancel_refresh = Some(cancel.clone());

        let args = LockArgs {
            uid: id.to_string(),
            resources: self.names.clone(),
            owner: self.owner.clone(),
            source: String::new(),
            quorum,
        };
        let mut lockers = self.lockers.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LOCK_REFRESH_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for locker in lockers.iter_mut() {
                            if let Err(err) = locker.refresh(&args).await {
                                warn!("unable to refresh lock lease for {}: {}", args, err);
                            }
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    fn stop_refresh(&mut self) {
        if let Some(cancel) = self.cancel_refresh.take() {
            cancel.cancel();
        }
    }

    pub async fn un_lock(&mut self) {
        if self.write_locks.is_empty() || !self.is_locked() {
            warn!("trying to un_lock() while no lock() is active, resources: {:?}", self.names);
            return;
        }

        self.stop_refresh();
        let is_read_lock = false;
        let mut locks = std::mem::take(&mut self.write_locks);
        let start = Instant::now();
        loop {
            if self.release_all(&mut locks, is_read_lock).await {
                return;
            }
            sleep(LOCK_RETRY_MIN_INTERVAL).await;
            if start.elapsed() > RELEASE_ALL_TIMEOUT {
                return;
            }
        }
    }

    pub async fn un_r_lock(&mut self) {
        if self.read_locks.is_empty() || !self.is_r_locked() {
            warn!("trying to un_r_lock() while no r_lock() is active, resources: {:?}", self.names);
            return;
        }

        self.stop_refresh();
        let is_read_lock = true;
        let mut locks = std::mem::take(&mut self.read_locks);
        let start = Instant::now();
        loop {
            if self.release_all(&mut locks, is_read_lock).await {
                return;
            }
            sleep(LOCK_RETRY_MIN_INTERVAL).await;
            if start.elapsed() > RELEASE_ALL_TIMEOUT {
                return;
            }
        }
    }

    async fn release_all(&mut self, locks: &mut [String], is_read_lock: bool) -> bool {
        for (index, locker) in self.lockers.iter_mut().enumerate() {
            if send_release(locker, &locks[index], &self.owner, &self.names, is_read_lock).await {
                locks[index] = String::new();
            }
        }

        locks.iter().all(|uid| !is_locked(uid))
    }
}

impl Drop for DRWMutex {
    fn drop(&mut self) {
        self.stop_refresh();
    }
}

async fn send_release(locker: &mut LockApi, uid: &str, owner: &str, names: &[String], is_read_lock: bool) -> bool {
    if uid.is_empty() {
        // Nothing was granted here.
        return true;
    }

    let args = LockArgs {
        uid: uid.to_string(),
        owner: owner.to_owned(),
        resources: names.to_owned(),
        ..Default::default()
    };

    let released = if is_read_lock {
        locker.runlock(&args).await
    } else {
        locker.unlock(&args).await
    };

    match released {
        Ok(ok) => {
            if !ok {
                warn!("peer did not hold the grant being released, args: {}", args);
            }
            true
        }
        Err(err) => {
            warn!("unable to release lock with {} for {}", err, args);
            false
        }
    }
}
