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

//! Radio: an active-active S3 mirroring gateway. Writes fan out to exactly
//! two remote replicas per logical bucket, reads come from whichever
//! replica is healthy, divergence is journaled and healed in the
//! background, and per-object mutations serialize through a distributed
//! namespace lock.

pub mod config;
pub mod server;
pub mod storage;
