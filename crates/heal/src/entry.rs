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

use radio_remote::RemoteSse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Operation recorded for replay against the failed replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalOp {
    PutObject,
    CopyObject,
    DeleteObject,
}

/// One divergence record. `err_client_id` names the replica that failed or
/// was offline, `src_client_id` the replica whose copy is authoritative.
/// The journal holds replica ids only, never client handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub op: JournalOp,
    pub bucket: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_object: Option<String>,
    /// Remote bucket of the failed replica under the logical bucket.
    pub replica_bucket: String,
    pub err_client_id: String,
    #[serde(default)]
    pub src_client_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radio_tag: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_meta: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sse: Option<RemoteSse>,
}

impl JournalEntry {
    pub fn new(op: JournalOp, bucket: &str, object: &str, replica_bucket: &str, err_client_id: &str) -> Self {
        Self {
            op,
            bucket: bucket.to_string(),
            object: object.to_string(),
            dst_bucket: None,
            dst_object: None,
            replica_bucket: replica_bucket.to_string(),
            err_client_id: err_client_id.to_string(),
            src_client_id: String::new(),
            timestamp: OffsetDateTime::now_utc(),
            etag: None,
            radio_tag: None,
            user_meta: HashMap::new(),
            sse: None,
        }
    }
}
