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

pub type Result<T> = std::result::Result<T, LockError>;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock acquisition timed out")]
    Timeout,

    #[error("invalid lock configuration: {0}")]
    Config(String),

    #[error("lock rpc transport: {0}")]
    Transport(String),

    #[error("lock peer rejected request: {0}")]
    Rejected(String),

    #[error("internal lock error: {0}")]
    Internal(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
