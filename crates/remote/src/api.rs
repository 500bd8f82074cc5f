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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::error::RemoteError;

/// Byte stream flowing to or from a replica.
pub type RemoteReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Server-side encryption marker carried between the gateway and the
/// replicas. Only the managed-key flavor is expressed; the marker exists so
/// divergence records can reproduce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteSse {
    S3,
}

/// Object metadata as one replica reports it. `user_metadata` keys are bare
/// (no `x-amz-meta-` prefix).
#[derive(Debug, Clone, Default)]
pub struct RemoteObjectInfo {
    pub key: String,
    pub size: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
    pub sse: Option<RemoteSse>,
    pub last_modified: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct RemotePart {
    pub part_number: usize,
    pub etag: Option<String>,
    pub size: i64,
}

/// One finished part, as sent back on multipart completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePart {
    pub part_number: usize,
    pub etag: String,
}

#[derive(Debug)]
pub struct RemoveObjectError {
    pub object: String,
    pub error: RemoteError,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteListObjects {
    pub objects: Vec<RemoteObjectInfo>,
    pub prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteListObjectsV2 {
    pub objects: Vec<RemoteObjectInfo>,
    pub prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteMultipartUpload {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteListMultipartUploads {
    pub uploads: Vec<RemoteMultipartUpload>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteStatOptions {
    pub sse: Option<RemoteSse>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteGetOptions {
    /// Inclusive byte range.
    pub range: Option<(i64, i64)>,
    pub sse: Option<RemoteSse>,
}

#[derive(Debug, Clone, Default)]
pub struct RemotePutOptions {
    pub user_metadata: HashMap<String, String>,
    pub content_type: Option<String>,
    pub content_md5_base64: Option<String>,
    pub content_sha256_hex: Option<String>,
    pub sse: Option<RemoteSse>,
}

/// Per-operation surface of one remote S3 endpoint. Every mirrored verb in
/// the gateway is composed from these primitives; implementations do not
/// retry (the gateway owns retry policy through the heal journal).
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError>;

    async fn stat_object(&self, bucket: &str, object: &str, opts: &RemoteStatOptions) -> Result<RemoteObjectInfo, RemoteError>;

    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        opts: &RemoteGetOptions,
    ) -> Result<(RemoteReader, RemoteObjectInfo), RemoteError>;

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: RemoteReader,
        size: i64,
        opts: &RemotePutOptions,
    ) -> Result<RemoteObjectInfo, RemoteError>;

    /// Server-side copy. `headers` carries the raw copy directives
    /// (`x-amz-metadata-directive`, `x-amz-copy-source-if-match`,
    /// `x-amz-meta-*`, SSE markers) exactly as the pipeline assembled them.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RemoteObjectInfo, RemoteError>;

    async fn remove_object(&self, bucket: &str, object: &str) -> Result<(), RemoteError>;

    /// Streaming batch removal: object names are consumed from `objects`,
    /// per-object failures flow back on the returned channel. The channel
    /// closes when the batch is done.
    async fn remove_objects(&self, bucket: &str, objects: mpsc::Receiver<String>) -> mpsc::Receiver<RemoveObjectError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<RemoteListObjects, RemoteError>;

    #[allow(clippy::too_many_arguments)]
    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        start_after: Option<String>,
    ) -> Result<RemoteListObjectsV2, RemoteError>;

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: i32,
    ) -> Result<RemoteListMultipartUploads, RemoteError>;

    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &RemotePutOptions) -> Result<String, RemoteError>;

    #[allow(clippy::too_many_arguments)]
    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: usize,
        data: RemoteReader,
        size: i64,
        opts: &RemotePutOptions,
    ) -> Result<RemotePart, RemoteError>;

    #[allow(clippy::too_many_arguments)]
    async fn copy_object_part(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        upload_id: &str,
        part_number: usize,
        start_offset: i64,
        length: i64,
        headers: &HashMap<String, String>,
    ) -> Result<CompletePart, RemoteError>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> Result<RemoteObjectInfo, RemoteError>;

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<(), RemoteError>;
}
