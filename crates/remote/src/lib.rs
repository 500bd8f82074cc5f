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

//! Remote replica access for the radio gateway.
//!
//! [`RemoteApi`] is the per-operation capability surface the mirrored
//! pipeline programs against; [`SdkRemote`] is the production adapter over
//! the AWS S3 SDK. [`ReplicaClient`] binds one remote endpoint to its
//! remote bucket, its stable replica id and the health flag the prober
//! maintains.

mod api;
mod error;
mod replica;
mod sdk;

pub use api::{
    CompletePart, RemoteApi, RemoteGetOptions, RemoteListMultipartUploads, RemoteListObjects, RemoteListObjectsV2,
    RemoteMultipartUpload, RemoteObjectInfo, RemotePart, RemotePutOptions, RemoteReader, RemoteSse, RemoteStatOptions,
    RemoveObjectError,
};
pub use error::RemoteError;
pub use replica::{HEALTH_CHECK_INTERVAL, ReplicaClient, client_id, connect, new_replica_clients, spawn_health_checker};
pub use sdk::SdkRemote;

use serde::{Deserialize, Serialize};

/// Connection tuple of one remote replica, as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub session_token: String,
}
