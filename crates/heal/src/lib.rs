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

//! Heal journal: durable per-(replica, bucket, object) divergence records
//! and the replay loop that converges failed replicas once they return.

mod entry;
mod journal;
mod replay;

pub use entry::{JournalEntry, JournalOp};
pub use journal::{HealSys, journal_file_name};
pub use replay::{ClientLookup, HEAL_REPLAY_INTERVAL, spawn_replay_loop};

pub type Result<T> = std::result::Result<T, HealError>;

#[derive(Debug, thiserror::Error)]
pub enum HealError {
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encoding: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("replica unavailable: {0}")]
    ReplicaUnavailable(String),

    #[error("replay failed: {0}")]
    Replay(String),
}
