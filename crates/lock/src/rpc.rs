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

//! Wire shapes shared by the lock RPC client and the peer service.

use serde::{Deserialize, Serialize};

pub const LOCK_RPC_PREFIX: &str = "/radio/lock/v1";

pub const METHOD_LOCK: &str = "lock";
pub const METHOD_UNLOCK: &str = "unlock";
pub const METHOD_RLOCK: &str = "rlock";
pub const METHOD_RUNLOCK: &str = "runlock";
pub const METHOD_REFRESH: &str = "refresh";
pub const METHOD_FORCE_UNLOCK: &str = "force-unlock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRpcResponse {
    pub success: bool,
    pub error_info: Option<String>,
}

impl LockRpcResponse {
    pub fn ok(success: bool) -> Self {
        Self {
            success,
            error_info: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_info: Some(message.into()),
        }
    }
}
