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

//! Local read/write mutex with acquisition timeouts. Contended acquisitions
//! poll with a small random sleep instead of queueing; fairness is not a
//! requirement for the namespace lock.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::info;

#[derive(Debug, Default)]
struct LrwState {
    id: String,
    source: String,
    is_write: bool,
    reference: usize,
}

#[derive(Debug, Default)]
pub struct LRWMutex {
    state: Mutex<LrwState>,
}

impl LRWMutex {
    pub async fn get_lock(&self, id: &str, source: &str, timeout: &Duration) -> bool {
        let is_write = true;
        self.lock_loop(id, source, timeout, is_write).await
    }

    pub async fn get_r_lock(&self, id: &str, source: &str, timeout: &Duration) -> bool {
        let is_write = false;
        self.lock_loop(id, source, timeout, is_write).await
    }

    async fn inner_lock(&self, id: &str, source: &str, is_write: bool) -> bool {
        let mut state = self.state.lock().await;

        let locked = if is_write {
            if state.reference == 0 && !state.is_write {
                state.reference = 1;
                state.is_write = true;
                true
            } else {
                false
            }
        } else if !state.is_write {
            state.reference += 1;
            true
        } else {
            false
        };

        if locked {
            state.id = id.to_string();
            state.source = source.to_string();
        }

        locked
    }

    async fn lock_loop(&self, id: &str, source: &str, timeout: &Duration, is_write: bool) -> bool {
        let start = Instant::now();
        loop {
            if self.inner_lock(id, source, is_write).await {
                return true;
            }
            if start.elapsed() > *timeout {
                return false;
            }
            let sleep_ms = {
                let mut rng = rand::rng();
                rng.random_range(10..=50)
            };
            sleep(Duration::from_millis(sleep_ms)).await;
        }
    }

    pub async fn un_lock(&self) {
        let is_write = true;
        if !self.unlock(is_write).await {
            info!("trying to un_lock() while no lock() is active");
        }
    }

    pub async fn un_r_lock(&self) {
        let is_write = false;
        if !self.unlock(is_write).await {
            info!("trying to un_r_lock() while no r_lock() is active");
        }
    }

    async fn unlock(&self, is_write: bool) -> bool {
        let mut state = self.state.lock().await;
        if is_write {
            if state.is_write && state.reference == 1 {
                state.reference = 0;
                state.is_write = false;
                return true;
            }
            false
        } else if !state.is_write && state.reference > 0 {
            state.reference -= 1;
            true
        } else {
            false
        }
    }

    pub async fn force_un_lock(&self) {
        let mut state = self.state.lock().await;
        state.reference = 0;
        state.is_write = false;
    }
}
