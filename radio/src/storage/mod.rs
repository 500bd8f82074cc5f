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

pub mod api;
pub mod error;
pub mod multipart;
pub mod radio;
pub mod reduce;

use std::time::Duration;

/// Lock acquisition deadline for data operations.
pub const GLOBAL_OBJECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lock acquisition deadline for multipart control operations.
pub const GLOBAL_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-call deadline for read-path stat probes.
pub const STAT_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(250);

pub(crate) fn path_join(a: &str, b: &str) -> String {
    format!("{a}/{b}")
}
