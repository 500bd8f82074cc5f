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

//! Per-peer lock table. Grants are tried, never waited for; retrying with
//! backoff is the acquirer's job.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{LockError, Result};
use crate::lock_args::LockArgs;

const MAX_RESOURCES_PER_REQUEST: usize = 1000;

#[derive(Clone, Debug)]
struct LockRequesterInfo {
    name: String,
    writer: bool,
    uid: String,
    owner: String,
    source: String,
    quorum: usize,
    time_stamp: Instant,
    time_last_refresh: Instant,
}

impl LockRequesterInfo {
    fn new(resource: &str, writer: bool, args: &LockArgs) -> Self {
        let now = Instant::now();
        Self {
            name: resource.to_string(),
            writer,
            uid: args.uid.clone(),
            owner: args.owner.clone(),
            source: args.source.clone(),
            quorum: args.quorum,
            time_stamp: now,
            time_last_refresh: now,
        }
    }

    fn matches(&self, args: &LockArgs) -> bool {
        self.uid == args.uid && (args.owner.is_empty() || self.owner == args.owner)
    }
}

fn is_write_lock(lris: &[LockRequesterInfo]) -> bool {
    lris.len() == 1 && lris[0].writer
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LockStats {
    pub total: usize,
    pub writes: usize,
    pub reads: usize,
}

#[derive(Debug, Default)]
pub struct LocalLocker {
    lock_map: HashMap<String, Vec<LockRequesterInfo>>,
}

impl LocalLocker {
    pub fn new() -> Self {
        LocalLocker::default()
    }

    fn can_take_lock(&self, resources: &[String]) -> bool {
        resources.iter().all(|r| !self.lock_map.contains_key(r))
    }

    pub fn lock(&mut self, args: &LockArgs) -> Result<bool> {
        if args.resources.len() > MAX_RESOURCES_PER_REQUEST {
            return Err(LockError::Internal(format!(
                "lock called with more than {MAX_RESOURCES_PER_REQUEST} resources"
            )));
        }

        if !self.can_take_lock(&args.resources) {
            return Ok(false);
        }

        for resource in args.resources.iter() {
            self.lock_map
                .insert(resource.clone(), vec![LockRequesterInfo::new(resource, true, args)]);
        }

        Ok(true)
    }

    pub fn unlock(&mut self, args: &LockArgs) -> Result<bool> {
        if args.resources.len() > MAX_RESOURCES_PER_REQUEST {
            return Err(LockError::Internal(format!(
                "unlock called with more than {MAX_RESOURCES_PER_REQUEST} resources"
            )));
        }

        let mut reply = false;
        for resource in args.resources.iter() {
            let Some(lris) = self.lock_map.get_mut(resource) else {
                continue;
            };
            if !is_write_lock(lris) {
                return Err(LockError::Rejected(format!("unlock attempted on a read locked entity: {resource}")));
            }
            lris.retain(|lri| {
                if lri.matches(args) {
                    reply = true;
                    return false;
                }
                true
            });
            if lris.is_empty() {
                self.lock_map.remove(resource);
            }
        }

        Ok(reply)
    }

    pub fn rlock(&mut self, args: &LockArgs) -> Result<bool> {
        if args.resources.len() != 1 {
            return Err(LockError::Internal("rlock called with more than one resource".to_string()));
        }

        let resource = &args.resources[0];
        match self.lock_map.get_mut(resource) {
            Some(lris) => {
                if is_write_lock(lris) {
                    return Ok(false);
                }
                lris.push(LockRequesterInfo::new(resource, false, args));
            }
            None => {
                self.lock_map
                    .insert(resource.clone(), vec![LockRequesterInfo::new(resource, false, args)]);
            }
        }

        Ok(true)
    }

    pub fn runlock(&mut self, args: &LockArgs) -> Result<bool> {
        if args.resources.len() != 1 {
            return Err(LockError::Internal("runlock called with more than one resource".to_string()));
        }

        let mut reply = false;
        let resource = &args.resources[0];
        if let Some(lris) = self.lock_map.get_mut(resource) {
            if is_write_lock(lris) {
                return Err(LockError::Rejected(format!("runlock attempted on a write locked entity: {resource}")));
            }
            lris.retain(|lri| {
                if lri.matches(args) {
                    reply = true;
                    return false;
                }
                true
            });
            if lris.is_empty() {
                self.lock_map.remove(resource);
            }
        }

        Ok(reply)
    }

    /// Extends the lease of every grant held under `args.uid`.
    pub fn refresh(&mut self, args: &LockArgs) -> Result<bool> {
        let mut refreshed = false;
        for lris in self.lock_map.values_mut() {
            for lri in lris.iter_mut() {
                if lri.uid == args.uid {
                    lri.time_last_refresh = Instant::now();
                    refreshed = true;
                }
            }
        }

        Ok(refreshed)
    }

    /// Releases grants regardless of mode. With an empty uid the named
    /// resources are cleared outright; otherwise every grant under the uid
    /// goes away.
    pub fn force_unlock(&mut self, args: &LockArgs) -> Result<bool> {
        if args.uid.is_empty() {
            let mut reply = false;
            for resource in args.resources.iter() {
                reply |= self.lock_map.remove(resource).is_some();
            }
            return Ok(reply);
        }

        let mut reply = false;
        self.lock_map.retain(|_, lris| {
            lris.retain(|lri| {
                if lri.uid == args.uid {
                    reply = true;
                    return false;
                }
                true
            });
            !lris.is_empty()
        });

        Ok(reply)
    }

    /// Drops grants that have not been refreshed within `ttl`. Returns the
    /// number of reclaimed grants.
    pub fn expire_old_locks(&mut self, ttl: Duration) -> usize {
        let mut expired = 0;
        self.lock_map.retain(|_, lris| {
            lris.retain(|lri| {
                if lri.time_last_refresh.elapsed() > ttl {
                    expired += 1;
                    return false;
                }
                true
            });
            !lris.is_empty()
        });

        expired
    }

    pub fn stats(&self) -> LockStats {
        let mut st = LockStats {
            total: self.lock_map.len(),
            ..Default::default()
        };
        for lris in self.lock_map.values() {
            if let Some(first) = lris.first() {
                if first.writer {
                    st.writes += 1;
                } else {
                    st.reads += 1;
                }
            }
        }
        st
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(uid: &str, resource: &str) -> LockArgs {
        LockArgs {
            uid: uid.to_string(),
            resources: vec![resource.to_string()],
            owner: "node-1".to_string(),
            source: String::new(),
            quorum: 1,
        }
    }

    #[test]
    fn test_write_lock_excludes_everyone() {
        let mut locker = LocalLocker::new();
        assert!(locker.lock(&args("w1", "b/o")).unwrap());
        assert!(!locker.lock(&args("w2", "b/o")).unwrap());
        assert!(!locker.rlock(&args("r1", "b/o")).unwrap());
        assert!(locker.unlock(&args("w1", "b/o")).unwrap());
        assert!(locker.rlock(&args("r1", "b/o")).unwrap());
    }

    #[test]
    fn test_readers_share_and_block_writer() {
        let mut locker = LocalLocker::new();
        assert!(locker.rlock(&args("r1", "b/o")).unwrap());
        assert!(locker.rlock(&args("r2", "b/o")).unwrap());
        assert!(!locker.lock(&args("w1", "b/o")).unwrap());
        assert!(locker.runlock(&args("r1", "b/o")).unwrap());
        assert!(!locker.lock(&args("w1", "b/o")).unwrap());
        assert!(locker.runlock(&args("r2", "b/o")).unwrap());
        assert!(locker.lock(&args("w1", "b/o")).unwrap());
    }

    #[test]
    fn test_unlock_wrong_uid_is_noop() {
        let mut locker = LocalLocker::new();
        assert!(locker.lock(&args("w1", "b/o")).unwrap());
        assert!(!locker.unlock(&args("other", "b/o")).unwrap());
        assert!(locker.unlock(&args("w1", "b/o")).unwrap());
    }

    #[test]
    fn test_expiry_reclaims_unrefreshed_grants() {
        let mut locker = LocalLocker::new();
        assert!(locker.lock(&args("w1", "b/o")).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(locker.expire_old_locks(Duration::from_millis(1)), 1);
        assert!(locker.lock(&args("w2", "b/o")).unwrap());
    }

    #[test]
    fn test_refresh_keeps_grant_alive() {
        let mut locker = LocalLocker::new();
        assert!(locker.lock(&args("w1", "b/o")).unwrap());
        std::thread::sleep(Duration::from_millis(20));
        assert!(locker.refresh(&args("w1", "b/o")).unwrap());
        assert_eq!(locker.expire_old_locks(Duration::from_millis(15)), 0);
        assert!(!locker.refresh(&args("unknown", "b/o")).unwrap());
    }

    #[test]
    fn test_force_unlock_by_uid_and_by_resource() {
        let mut locker = LocalLocker::new();
        assert!(locker.lock(&args("w1", "b/o1")).unwrap());
        assert!(locker.rlock(&args("r1", "b/o2")).unwrap());

        assert!(locker.force_unlock(&args("w1", "b/o1")).unwrap());
        assert!(locker.lock(&args("w2", "b/o1")).unwrap());

        let by_resource = LockArgs {
            uid: String::new(),
            resources: vec!["b/o2".to_string()],
            ..Default::default()
        };
        assert!(locker.force_unlock(&by_resource).unwrap());
        assert!(locker.lock(&args("w3", "b/o2")).unwrap());
    }

    #[test]
    fn test_stats() {
        let mut locker = LocalLocker::new();
        locker.lock(&args("w1", "b/o1")).unwrap();
        locker.rlock(&args("r1", "b/o2")).unwrap();
        let st = locker.stats();
        assert_eq!(st.total, 2);
        assert_eq!(st.writes, 1);
        assert_eq!(st.reads, 1);
    }
}
