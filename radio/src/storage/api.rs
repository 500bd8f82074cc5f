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

//! Gateway-native object types and the [`ObjectLayer`] trait the S3
//! front-end consumes.

use async_trait::async_trait;
use radio_lock::namespace_lock::WrapperLocker;
use radio_remote::{RemoteObjectInfo, RemoteReader, RemoteSse};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;

use crate::storage::error::{Result, StorageError};

pub use radio_remote::CompletePart;

/// User-metadata key carrying the gateway-minted correlation tag.
pub const RADIO_TAG_KEY: &str = "x-amz-meta-radio-tag";

pub const USER_METADATA_PREFIX: &str = "x-amz-meta-";
pub const METADATA_DIRECTIVE_HEADER: &str = "x-amz-metadata-directive";
pub const COPY_SOURCE_IF_MATCH_HEADER: &str = "x-amz-copy-source-if-match";
pub const SSE_HEADER: &str = "x-amz-server-side-encryption";
pub const CONTENT_TYPE_KEY: &str = "content-type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    NoLock,
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct BucketInfo {
    pub name: String,
    pub created: OffsetDateTime,
}

/// Object metadata as served by the gateway. `replica_index` records which
/// replica produced this view so a follow-up body read goes to the same
/// replica.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    pub size: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub user_defined: HashMap<String, String>,
    pub sse: Option<RemoteSse>,
    pub mod_time: Option<OffsetDateTime>,
    pub replica_index: usize,
}

impl Default for ObjectInfo {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            name: String::new(),
            size: 0,
            etag: None,
            content_type: None,
            user_defined: HashMap::new(),
            sse: None,
            mod_time: None,
            replica_index: 0,
        }
    }
}

impl ObjectInfo {
    pub fn from_remote(bucket: &str, info: RemoteObjectInfo, replica_index: usize) -> Self {
        Self {
            bucket: bucket.to_string(),
            name: info.key.clone(),
            size: info.size,
            etag: info.etag.clone(),
            content_type: info.content_type.clone(),
            user_defined: from_remote_metadata(&info.user_metadata),
            sse: info.sse,
            mod_time: info.last_modified,
            replica_index,
        }
    }

    pub fn radio_tag(&self) -> Option<&str> {
        self.user_defined.get(RADIO_TAG_KEY).map(String::as_str)
    }
}

/// Maps gateway user metadata (`x-amz-meta-*` keys) to the bare-key form a
/// replica client expects.
pub fn to_remote_metadata(user_defined: &HashMap<String, String>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (key, value) in user_defined {
        let lower = key.to_ascii_lowercase();
        if let Some(bare) = lower.strip_prefix(USER_METADATA_PREFIX) {
            if !bare.is_empty() {
                out.insert(bare.to_string(), value.clone());
            }
        }
    }
    out
}

/// Inverse of [`to_remote_metadata`].
pub fn from_remote_metadata(metadata: &HashMap<String, String>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (key, value) in metadata {
        out.insert(format!("{USER_METADATA_PREFIX}{}", key.to_ascii_lowercase()), value.clone());
    }
    out
}

pub type CopyPrecondFn = Arc<dyn Fn(&ObjectInfo, &str) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ObjectOptions {
    pub user_defined: HashMap<String, String>,
    pub server_side_encryption: Option<RemoteSse>,
    /// Returns true when the copy precondition fails for the given source.
    pub check_copy_precond: Option<CopyPrecondFn>,
}

impl std::fmt::Debug for ObjectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectOptions")
            .field("user_defined", &self.user_defined)
            .field("server_side_encryption", &self.server_side_encryption)
            .field("check_copy_precond", &self.check_copy_precond.is_some())
            .finish()
    }
}

/// Incoming object payload plus the content hashes the front-end computed
/// for it. The hashes are forwarded verbatim to every replica so mirrored
/// writes are byte- and digest-identical.
pub struct PutObjReader {
    pub stream: RemoteReader,
    pub size: i64,
    pub md5_base64: Option<String>,
    pub sha256_hex: Option<String>,
}

impl std::fmt::Debug for PutObjReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjReader").field("size", &self.size).finish()
    }
}

impl PutObjReader {
    pub fn new(stream: RemoteReader, size: i64, md5_base64: Option<String>, sha256_hex: Option<String>) -> Self {
        Self {
            stream,
            size,
            md5_base64,
            sha256_hex,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let size = data.len() as i64;
        Self {
            stream: Box::new(Cursor::new(data)),
            size,
            md5_base64: None,
            sha256_hex: None,
        }
    }
}

/// Streamed object body. Holds the namespace lock (when one was taken)
/// until the reader is dropped.
pub struct GetObjectReader {
    pub stream: RemoteReader,
    pub object_info: ObjectInfo,
    _lock: Option<WrapperLocker>,
}

impl GetObjectReader {
    pub fn new(stream: RemoteReader, object_info: ObjectInfo, lock: Option<WrapperLocker>) -> Self {
        Self {
            stream,
            object_info,
            _lock: lock,
        }
    }

    pub async fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.stream.read_to_end(&mut data).await?;
        Ok(data)
    }
}

/// HTTP range request, translated by the front-end.
#[derive(Debug, Clone, Copy)]
pub struct HTTPRangeSpec {
    pub is_suffix_length: bool,
    pub start: i64,
    pub end: i64,
}

impl HTTPRangeSpec {
    pub fn get_length(&self, resource_size: i64) -> Result<i64> {
        if resource_size < 0 {
            return Err(StorageError::InvalidRange);
        }

        if self.is_suffix_length {
            let specified = -self.start;
            return Ok(specified.min(resource_size));
        }

        if self.start >= resource_size {
            return Err(StorageError::InvalidRange);
        }

        if self.end > -1 {
            let end = self.end.min(resource_size - 1);
            return Ok(end - self.start + 1);
        }

        Ok(resource_size - self.start)
    }

    /// Absolute offset and length of the requested slice.
    pub fn get_offset_length(&self, resource_size: i64) -> Result<(i64, i64)> {
        let length = self.get_length(resource_size)?;
        let start = if self.is_suffix_length {
            (resource_size + self.start).max(0)
        } else {
            self.start
        };
        Ok((start, length))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsInfo {
    pub objects: Vec<ObjectInfo>,
    pub prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Info {
    pub objects: Vec<ObjectInfo>,
    pub prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MultipartUploadInfo {
    pub object: String,
    pub upload_id: String,
    pub initiated: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMultipartsInfo {
    pub uploads: Vec<MultipartUploadInfo>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PartInfo {
    pub part_number: usize,
    pub etag: Option<String>,
    pub size: i64,
}

/// The verbs the S3 front-end dispatches into the mirrored pipeline.
#[async_trait]
#[allow(clippy::too_many_arguments)]
pub trait ObjectLayer: Send + Sync + 'static {
    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo>;
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsInfo>;

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        start_after: Option<String>,
    ) -> Result<ListObjectsV2Info>;

    async fn get_object_info(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo>;

    async fn get_object_reader(
        &self,
        bucket: &str,
        object: &str,
        range: Option<HTTPRangeSpec>,
        lock_type: LockType,
        opts: &ObjectOptions,
    ) -> Result<GetObjectReader>;

    async fn put_object(&self, bucket: &str, object: &str, data: PutObjReader, opts: &ObjectOptions) -> Result<ObjectInfo>;

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        src_info: &mut ObjectInfo,
        src_opts: &ObjectOptions,
        dst_opts: &ObjectOptions,
    ) -> Result<ObjectInfo>;

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()>;

    /// Batch delete; the returned vector lines up with `objects` and holds
    /// the per-object failure, if any.
    async fn delete_objects(&self, bucket: &str, objects: Vec<String>) -> Result<Vec<Option<StorageError>>>;

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: i32,
    ) -> Result<ListMultipartsInfo>;

    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<String>;

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: PutObjReader,
        opts: &ObjectOptions,
    ) -> Result<PartInfo>;

    async fn copy_object_part(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        upload_id: &str,
        part_id: usize,
        start_offset: i64,
        length: i64,
        src_info: &ObjectInfo,
        src_opts: &ObjectOptions,
        dst_opts: &ObjectOptions,
    ) -> Result<PartInfo>;

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo>;
}
