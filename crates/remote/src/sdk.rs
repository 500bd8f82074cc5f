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

//! AWS S3 SDK adapter for [`RemoteApi`]. Kept deliberately thin: static
//! credentials, custom endpoint, path-style addressing, retries disabled
//! and the gateway's transport timeouts.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, MetadataDirective, ObjectIdentifier, ServerSideEncryption,
};
use base64::Engine as _;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

use crate::RemoteConfig;
use crate::api::{
    CompletePart, RemoteApi, RemoteGetOptions, RemoteListMultipartUploads, RemoteListObjects, RemoteListObjectsV2,
    RemoteMultipartUpload, RemoteObjectInfo, RemotePart, RemotePutOptions, RemoteReader, RemoteSse, RemoteStatOptions,
    RemoveObjectError,
};
use crate::error::RemoteError;

const DEFAULT_REGION: &str = "us-east-1";
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
const MAX_DELETE_BATCH: usize = 1000;

const METADATA_DIRECTIVE_HEADER: &str = "x-amz-metadata-directive";
const COPY_SOURCE_IF_MATCH_HEADER: &str = "x-amz-copy-source-if-match";
const SSE_HEADER: &str = "x-amz-server-side-encryption";
const USER_METADATA_PREFIX: &str = "x-amz-meta-";

#[derive(Debug, Clone)]
pub struct SdkRemote {
    client: Client,
}

impl SdkRemote {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        if cfg.endpoint.is_empty() {
            return Err(RemoteError::Config("remote endpoint is required".to_string()));
        }
        if cfg.bucket.is_empty() {
            return Err(RemoteError::Config("remote bucket is required".to_string()));
        }

        let session_token = if cfg.session_token.is_empty() {
            None
        } else {
            Some(cfg.session_token.clone())
        };
        let credentials = Credentials::new(cfg.access_key.clone(), cfg.secret_key.clone(), session_token, None, "radio");

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(DIAL_TIMEOUT)
            .read_timeout(RESPONSE_HEADER_TIMEOUT)
            .build();

        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(DEFAULT_REGION))
            .endpoint_url(cfg.endpoint.clone())
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .timeout_config(timeouts)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
        })
    }
}

fn from_sdk<E, R>(err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}", aws_smithy_types::error::display::DisplayErrorContext(&err)));

    match code.as_deref() {
        Some("NoSuchBucket") => RemoteError::BucketNotFound(message),
        Some("NoSuchKey") | Some("NotFound") => RemoteError::ObjectNotFound(message),
        Some("NoSuchUpload") => RemoteError::UploadNotFound(message),
        Some("PreconditionFailed") => RemoteError::PreconditionFailed,
        Some(code) => RemoteError::Api {
            code: code.to_string(),
            message,
        },
        None => RemoteError::Other(message),
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn sse_from(sse: Option<&ServerSideEncryption>) -> Option<RemoteSse> {
    match sse {
        Some(ServerSideEncryption::Aes256) => Some(RemoteSse::S3),
        _ => None,
    }
}

fn to_offset_datetime(dt: &aws_smithy_types::DateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(dt.secs()).ok()
}

// The SDK body wants an http_body 1.x stream; bridge the duplicated reader
// through a frame stream without buffering the payload.
fn stream_body(data: RemoteReader) -> ByteStream {
    let frames = ReaderStream::with_capacity(data, UPLOAD_CHUNK_SIZE).map_ok(http_body::Frame::data);
    ByteStream::from_body_1_x(http_body_util::StreamBody::new(frames))
}

fn sha256_hex_to_base64(hex_digest: &str) -> Option<String> {
    let raw = hex::decode(hex_digest).ok()?;
    Some(base64::engine::general_purpose::STANDARD.encode(raw))
}

fn object_info_from_entry(entry: &aws_sdk_s3::types::Object) -> RemoteObjectInfo {
    RemoteObjectInfo {
        key: entry.key().unwrap_or_default().to_string(),
        size: entry.size().unwrap_or_default(),
        etag: entry.e_tag().map(trim_etag),
        last_modified: entry.last_modified().and_then(to_offset_datetime),
        ..Default::default()
    }
}

#[async_trait]
impl RemoteApi for SdkRemote {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) {
                    return Ok(false);
                }
                Err(from_sdk(err))
            }
        }
    }

    async fn stat_object(&self, bucket: &str, object: &str, _opts: &RemoteStatOptions) -> Result<RemoteObjectInfo, RemoteError> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(object)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) {
                    RemoteError::ObjectNotFound(format!("{bucket}/{object}"))
                } else {
                    from_sdk(err)
                }
            })?;

        Ok(RemoteObjectInfo {
            key: object.to_string(),
            size: resp.content_length().unwrap_or_default(),
            etag: resp.e_tag().map(trim_etag),
            content_type: resp.content_type().map(str::to_string),
            user_metadata: resp.metadata().cloned().unwrap_or_default(),
            sse: sse_from(resp.server_side_encryption()),
            last_modified: resp.last_modified().and_then(to_offset_datetime),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        opts: &RemoteGetOptions,
    ) -> Result<(RemoteReader, RemoteObjectInfo), RemoteError> {
        let mut req = self.client.get_object().bucket(bucket).key(object);
        if let Some((start, end)) = opts.range {
            req = req.range(format!("bytes={start}-{end}"));
        }

        let resp = req.send().await.map_err(|err| {
            if err.as_service_error().map(|e| e.is_no_such_key()).unwrap_or(false) {
                RemoteError::ObjectNotFound(format!("{bucket}/{object}"))
            } else {
                from_sdk(err)
            }
        })?;

        let info = RemoteObjectInfo {
            key: object.to_string(),
            size: resp.content_length().unwrap_or_default(),
            etag: resp.e_tag().map(trim_etag),
            content_type: resp.content_type().map(str::to_string),
            user_metadata: resp.metadata().cloned().unwrap_or_default(),
            sse: sse_from(resp.server_side_encryption()),
            last_modified: resp.last_modified().and_then(to_offset_datetime),
        };

        Ok((Box::new(resp.body.into_async_read()), info))
    }

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: RemoteReader,
        size: i64,
        opts: &RemotePutOptions,
    ) -> Result<RemoteObjectInfo, RemoteError> {
        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(object)
            .body(stream_body(data))
            .content_length(size);

        if let Some(content_type) = &opts.content_type {
            req = req.content_type(content_type.as_str());
        }
        if let Some(md5) = &opts.content_md5_base64 {
            req = req.content_md5(md5.as_str());
        }
        if let Some(b64) = opts.content_sha256_hex.as_deref().and_then(sha256_hex_to_base64) {
            req = req.checksum_sha256(b64);
        }
        if !opts.user_metadata.is_empty() {
            req = req.set_metadata(Some(opts.user_metadata.clone()));
        }
        if opts.sse == Some(RemoteSse::S3) {
            req = req.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let resp = req.send().await.map_err(from_sdk)?;

        Ok(RemoteObjectInfo {
            key: object.to_string(),
            size,
            etag: resp.e_tag().map(trim_etag),
            content_type: opts.content_type.clone(),
            user_metadata: opts.user_metadata.clone(),
            sse: opts.sse,
            last_modified: None,
        })
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RemoteObjectInfo, RemoteError> {
        let mut req = self
            .client
            .copy_object()
            .bucket(dst_bucket)
            .key(dst_object)
            .copy_source(format!("{src_bucket}/{src_object}"));

        if headers
            .get(METADATA_DIRECTIVE_HEADER)
            .map(|d| d.eq_ignore_ascii_case("replace"))
            .unwrap_or(false)
        {
            req = req.metadata_directive(MetadataDirective::Replace);
        }
        if let Some(etag) = headers.get(COPY_SOURCE_IF_MATCH_HEADER) {
            req = req.copy_source_if_match(etag.as_str());
        }

        let mut metadata = HashMap::new();
        for (key, value) in headers {
            if let Some(name) = key.strip_prefix(USER_METADATA_PREFIX) {
                metadata.insert(name.to_string(), value.clone());
            }
        }
        if !metadata.is_empty() {
            req = req.set_metadata(Some(metadata.clone()));
        }
        if headers.contains_key(SSE_HEADER) {
            req = req.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let resp = req.send().await.map_err(from_sdk)?;
        let etag = resp.copy_object_result().and_then(|r| r.e_tag()).map(trim_etag);

        Ok(RemoteObjectInfo {
            key: dst_object.to_string(),
            etag,
            user_metadata: metadata,
            ..Default::default()
        })
    }

    async fn remove_object(&self, bucket: &str, object: &str) -> Result<(), RemoteError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(object)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn remove_objects(&self, bucket: &str, mut objects: mpsc::Receiver<String>) -> mpsc::Receiver<RemoveObjectError> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let bucket = bucket.to_string();

        tokio::spawn(async move {
            let mut batch: Vec<String> = Vec::new();
            loop {
                let done = match objects.recv().await {
                    Some(name) => {
                        batch.push(name);
                        false
                    }
                    None => true,
                };

                if batch.len() >= MAX_DELETE_BATCH || (done && !batch.is_empty()) {
                    flush_delete_batch(&client, &bucket, std::mem::take(&mut batch), &tx).await;
                }
                if done {
                    return;
                }
            }
        });

        rx
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<RemoteListObjects, RemoteError> {
        let mut req = self.client.list_objects().bucket(bucket).prefix(prefix).max_keys(max_keys);
        if let Some(marker) = marker {
            req = req.marker(marker);
        }
        if let Some(delimiter) = delimiter {
            req = req.delimiter(delimiter);
        }

        let resp = req.send().await.map_err(from_sdk)?;

        Ok(RemoteListObjects {
            objects: resp.contents().iter().map(object_info_from_entry).collect(),
            prefixes: resp
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            is_truncated: resp.is_truncated().unwrap_or_default(),
            next_marker: resp.next_marker().map(str::to_string),
        })
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        start_after: Option<String>,
    ) -> Result<RemoteListObjectsV2, RemoteError> {
        let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix).max_keys(max_keys);
        if let Some(token) = continuation_token {
            req = req.continuation_token(token);
        }
        if let Some(delimiter) = delimiter {
            req = req.delimiter(delimiter);
        }
        if let Some(start_after) = start_after {
            req = req.start_after(start_after);
        }

        let resp = req.send().await.map_err(from_sdk)?;

        Ok(RemoteListObjectsV2 {
            objects: resp.contents().iter().map(object_info_from_entry).collect(),
            prefixes: resp
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            is_truncated: resp.is_truncated().unwrap_or_default(),
            next_continuation_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: i32,
    ) -> Result<RemoteListMultipartUploads, RemoteError> {
        let mut req = self
            .client
            .list_multipart_uploads()
            .bucket(bucket)
            .prefix(prefix)
            .max_uploads(max_uploads);
        if let Some(key_marker) = key_marker {
            req = req.key_marker(key_marker);
        }
        if let Some(upload_id_marker) = upload_id_marker {
            req = req.upload_id_marker(upload_id_marker);
        }
        if let Some(delimiter) = delimiter {
            req = req.delimiter(delimiter);
        }

        let resp = req.send().await.map_err(from_sdk)?;

        Ok(RemoteListMultipartUploads {
            uploads: resp
                .uploads()
                .iter()
                .map(|u| RemoteMultipartUpload {
                    key: u.key().unwrap_or_default().to_string(),
                    upload_id: u.upload_id().unwrap_or_default().to_string(),
                    initiated: u.initiated().and_then(to_offset_datetime),
                })
                .collect(),
            is_truncated: resp.is_truncated().unwrap_or_default(),
            next_key_marker: resp.next_key_marker().map(str::to_string),
            next_upload_id_marker: resp.next_upload_id_marker().map(str::to_string),
        })
    }

    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &RemotePutOptions) -> Result<String, RemoteError> {
        let mut req = self.client.create_multipart_upload().bucket(bucket).key(object);
        if let Some(content_type) = &opts.content_type {
            req = req.content_type(content_type.as_str());
        }
        if !opts.user_metadata.is_empty() {
            req = req.set_metadata(Some(opts.user_metadata.clone()));
        }
        if opts.sse == Some(RemoteSse::S3) {
            req = req.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let resp = req.send().await.map_err(from_sdk)?;
        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Other("upload id missing in multipart response".to_string()))
    }

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: usize,
        data: RemoteReader,
        size: i64,
        opts: &RemotePutOptions,
    ) -> Result<RemotePart, RemoteError> {
        let mut req = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(object)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(stream_body(data))
            .content_length(size);
        if let Some(md5) = &opts.content_md5_base64 {
            req = req.content_md5(md5.as_str());
        }

        let resp = req.send().await.map_err(from_sdk)?;

        Ok(RemotePart {
            part_number,
            etag: resp.e_tag().map(trim_etag),
            size,
        })
    }

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
    ) -> Result<CompletePart, RemoteError> {
        let mut req = self
            .client
            .upload_part_copy()
            .bucket(dst_bucket)
            .key(dst_object)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .copy_source(format!("{src_bucket}/{src_object}"));

        if length > 0 {
            req = req.copy_source_range(format!("bytes={}-{}", start_offset, start_offset + length - 1));
        }
        if let Some(etag) = headers.get(COPY_SOURCE_IF_MATCH_HEADER) {
            req = req.copy_source_if_match(etag.as_str());
        }

        let resp = req.send().await.map_err(from_sdk)?;
        let etag = resp
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(trim_etag)
            .unwrap_or_default();

        Ok(CompletePart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> Result<RemoteObjectInfo, RemoteError> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(p.etag.clone())
                    .build()
            })
            .collect();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(object)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(from_sdk)?;

        Ok(RemoteObjectInfo {
            key: object.to_string(),
            etag: resp.e_tag().map(trim_etag),
            ..Default::default()
        })
    }

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<(), RemoteError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(object)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }
}

async fn flush_delete_batch(client: &Client, bucket: &str, names: Vec<String>, tx: &mpsc::Sender<RemoveObjectError>) {
    let mut identifiers = Vec::with_capacity(names.len());
    for name in names.iter() {
        match ObjectIdentifier::builder().key(name).build() {
            Ok(id) => identifiers.push(id),
            Err(err) => {
                let _ = tx
                    .send(RemoveObjectError {
                        object: name.clone(),
                        error: RemoteError::other(err),
                    })
                    .await;
            }
        }
    }
    if identifiers.is_empty() {
        return;
    }

    let delete = match Delete::builder().set_objects(Some(identifiers)).quiet(true).build() {
        Ok(delete) => delete,
        Err(err) => {
            for name in names {
                let _ = tx
                    .send(RemoveObjectError {
                        object: name,
                        error: RemoteError::other(&err),
                    })
                    .await;
            }
            return;
        }
    };

    match client.delete_objects().bucket(bucket).delete(delete).send().await {
        Ok(resp) => {
            for e in resp.errors() {
                let _ = tx
                    .send(RemoveObjectError {
                        object: e.key().unwrap_or_default().to_string(),
                        error: RemoteError::Api {
                            code: e.code().unwrap_or("Unknown").to_string(),
                            message: e.message().unwrap_or_default().to_string(),
                        },
                    })
                    .await;
            }
        }
        Err(err) => {
            let failure = from_sdk(err);
            for name in names {
                let _ = tx
                    .send(RemoveObjectError {
                        object: name,
                        error: RemoteError::Api {
                            code: failure.code().unwrap_or("Unknown").to_string(),
                            message: failure.to_string(),
                        },
                    })
                    .await;
            }
        }
    }
}
