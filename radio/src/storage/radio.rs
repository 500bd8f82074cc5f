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

//! The mirrored object pipeline. Every verb is a pattern over the same
//! four moves: take the namespace lock, fan the work out to both replicas,
//! reduce the per-replica outcomes, and journal whichever replica
//! diverged. No acknowledgment leaves the gateway while a replica
//! operation is still in flight.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use radio_heal::{ClientLookup, HealSys, JournalEntry, JournalOp};
use radio_lock::drwmutex::Options as LockOptions;
use radio_lock::namespace_lock::{NsLockMap, WrapperLocker, new_nslock};
use radio_lock::{LockApi, new_lock_api};
use radio_remote::{
    RemoteError, RemoteGetOptions, RemotePutOptions, RemoteStatOptions, ReplicaClient, new_replica_clients,
    spawn_health_checker,
};

use crate::config::{PeerEndpoint, RadioConfig};
use crate::storage::api::{
    BucketInfo, COPY_SOURCE_IF_MATCH_HEADER, CONTENT_TYPE_KEY, CompletePart, GetObjectReader, HTTPRangeSpec,
    ListMultipartsInfo, ListObjectsInfo, ListObjectsV2Info, LockType, METADATA_DIRECTIVE_HEADER, MultipartUploadInfo,
    ObjectInfo, ObjectLayer, ObjectOptions, PartInfo, PutObjReader, RADIO_TAG_KEY, SSE_HEADER, to_remote_metadata,
};
use crate::storage::error::{Result, StorageError, to_object_err};
use crate::storage::multipart::MultipartUploadMap;
use crate::storage::reduce::reduce_write_errs;
use crate::storage::{GLOBAL_OBJECT_TIMEOUT, GLOBAL_OPERATION_TIMEOUT, LOCK_RETRY_INTERVAL, STAT_TIMEOUT, path_join};

const GET_PIPE_DEPTH: usize = 2;
const GET_CHUNK_SIZE: usize = 64 * 1024;

/// The ordered replica clients of one logical bucket. The position in the
/// list is the replica index; peers must configure the same order.
#[derive(Clone)]
pub struct MirrorBinding {
    pub clients: Vec<Arc<ReplicaClient>>,
}

/// Gateway factory: validated configuration plus the lock peer set.
pub struct Radio {
    pub rconfig: RadioConfig,
    pub endpoints: Vec<PeerEndpoint>,
    pub owner: String,
}

impl Radio {
    /// Builds the object layer: connects every replica, starts the health
    /// checkers and assembles the lock peer clients.
    pub async fn new_object_layer(&self, heal: Arc<HealSys>, cancel: &CancellationToken) -> Result<Arc<RadioStore>> {
        let mut lockers = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let locker = new_lock_api(endpoint.is_local, Some(endpoint.url.clone()), &self.rconfig.distribute.token)
                .map_err(|err| StorageError::Lock(err.to_string()))?;
            lockers.push(locker);
        }

        let mut mirror_clients = HashMap::new();
        for (bucket, cfg) in &self.rconfig.buckets {
            if cfg.remote.len() != 2 {
                return Err(StorageError::InvalidArgument(
                    bucket.clone(),
                    String::new(),
                    format!("invalid remote configuration, expecting 2 remotes, got {}", cfg.remote.len()),
                ));
            }

            let clients = new_replica_clients(&cfg.remote)
                .await
                .map_err(|err| StorageError::Remote(err.to_string()))?;
            spawn_health_checker(clients.clone(), cancel.child_token());
            info!("mirror binding ready for bucket {} with {} replicas", bucket, clients.len());
            mirror_clients.insert(bucket.clone(), MirrorBinding { clients });
        }

        Ok(RadioStore::new(mirror_clients, lockers, self.owner.clone(), heal))
    }
}

/// The mirrored object layer.
pub struct RadioStore {
    mirror_clients: HashMap<String, MirrorBinding>,
    uploads: MultipartUploadMap,
    ns: Arc<RwLock<NsLockMap>>,
    lockers: Vec<LockApi>,
    owner: String,
    heal: Arc<HealSys>,
}

impl RadioStore {
    pub fn new(
        mirror_clients: HashMap<String, MirrorBinding>,
        lockers: Vec<LockApi>,
        owner: String,
        heal: Arc<HealSys>,
    ) -> Arc<Self> {
        let is_dist = !lockers.is_empty();
        Arc::new(Self {
            mirror_clients,
            uploads: MultipartUploadMap::default(),
            ns: Arc::new(RwLock::new(NsLockMap::new(is_dist))),
            lockers,
            owner,
            heal,
        })
    }

    pub fn heal(&self) -> &Arc<HealSys> {
        &self.heal
    }

    fn binding(&self, bucket: &str) -> Result<&MirrorBinding> {
        self.mirror_clients
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    async fn new_ns_lock(&self, bucket: &str, object: &str) -> WrapperLocker {
        new_nslock(
            Arc::clone(&self.ns),
            self.owner.clone(),
            bucket.to_string(),
            vec![object.to_string()],
            self.lockers.clone(),
        )
        .await
    }

    async fn acquire_write(&self, lock: &WrapperLocker, timeout: Duration) -> Result<()> {
        let locked = lock
            .0
            .write()
            .await
            .get_lock(&lock_opts(timeout))
            .await
            .map_err(|err| StorageError::Lock(err.to_string()))?;
        if !locked {
            return Err(StorageError::OperationTimedOut);
        }
        Ok(())
    }

    async fn acquire_read(&self, lock: &WrapperLocker, timeout: Duration) -> Result<()> {
        let locked = lock
            .0
            .write()
            .await
            .get_r_lock(&lock_opts(timeout))
            .await
            .map_err(|err| StorageError::Lock(err.to_string()))?;
        if !locked {
            return Err(StorageError::OperationTimedOut);
        }
        Ok(())
    }

    /// Read-path stat fan-out. A replica is eligible when it is online and
    /// the journal holds no divergence naming it for this object; the first
    /// eligible success in index order wins.
    async fn get_object_info_inner(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let binding = self.binding(bucket)?;
        let n = binding.clients.len();

        let mut eligible = vec![true; n];
        for (index, clnt) in binding.clients.iter().enumerate() {
            if clnt.is_offline() {
                eligible[index] = false;
                continue;
            }
            if let Some(entry) = self.heal.read_latest(&clnt.bucket, bucket, object).await {
                if entry.err_client_id == clnt.id {
                    eligible[index] = false;
                }
            }
        }

        let stat_opts = RemoteStatOptions {
            sse: opts.server_side_encryption,
        };
        let stats = join_all(binding.clients.iter().enumerate().map(|(index, clnt)| {
            let clnt = Arc::clone(clnt);
            let object = object.to_string();
            let stat_opts = stat_opts.clone();
            let run = eligible[index];
            async move {
                if !run {
                    return None;
                }
                let result = tokio::time::timeout(STAT_TIMEOUT, clnt.remote.stat_object(&clnt.bucket, &object, &stat_opts))
                    .await
                    .unwrap_or_else(|_| Err(RemoteError::Other("stat timed out".to_string())));
                Some(result)
            }
        }))
        .await;

        let mut first_err = None;
        for (index, outcome) in stats.into_iter().enumerate() {
            match outcome {
                None => {}
                Some(Ok(info)) => return Ok(ObjectInfo::from_remote(bucket, info, index)),
                Some(Err(err)) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        match first_err {
            Some(err) => Err(to_object_err(&err, bucket, object)),
            None => Err(StorageError::BackendDown),
        }
    }

    fn journal_put_failure(
        &self,
        binding: &MirrorBinding,
        index: usize,
        rindex: usize,
        bucket: &str,
        object: &str,
        etag: Option<String>,
        radio_tag: Option<String>,
        user_meta: HashMap<String, String>,
        sse: Option<radio_remote::RemoteSse>,
    ) {
        let clnt = &binding.clients[index];
        let mut entry = JournalEntry::new(JournalOp::PutObject, bucket, object, &clnt.bucket, &clnt.id);
        entry.src_client_id = binding.clients[rindex].id.clone();
        entry.etag = etag;
        entry.radio_tag = radio_tag;
        entry.user_meta = user_meta;
        entry.sse = sse;
        self.heal.send(entry);
    }
}

fn lock_opts(timeout: Duration) -> LockOptions {
    LockOptions {
        timeout,
        retry_interval: LOCK_RETRY_INTERVAL,
    }
}

async fn release(lock: &WrapperLocker) {
    if let Err(err) = lock.0.write().await.release().await {
        warn!("namespace lock release failed: {}", err);
    }
}

fn split_results<T>(results: Vec<std::result::Result<T, RemoteError>>) -> (Vec<Option<T>>, Vec<Option<RemoteError>>) {
    let mut values = Vec::with_capacity(results.len());
    let mut errs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(value) => {
                values.push(Some(value));
                errs.push(None);
            }
            Err(err) => {
                values.push(None);
                errs.push(Some(err));
            }
        }
    }
    (values, errs)
}

#[async_trait]
impl ObjectLayer for RadioStore {
    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        self.binding(bucket)?;
        Ok(BucketInfo {
            name: bucket.to_string(),
            created: time::OffsetDateTime::now_utc(),
        })
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        Ok(self
            .mirror_clients
            .keys()
            .map(|name| BucketInfo {
                name: name.clone(),
                created: time::OffsetDateTime::now_utc(),
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsInfo> {
        let binding = self.binding(bucket)?;

        let mut last_err = None;
        for clnt in binding.clients.iter() {
            match clnt
                .remote
                .list_objects(&clnt.bucket, prefix, marker.clone(), delimiter.clone(), max_keys)
                .await
            {
                Ok(result) => {
                    return Ok(ListObjectsInfo {
                        objects: result
                            .objects
                            .into_iter()
                            .map(|entry| ObjectInfo::from_remote(bucket, entry, 0))
                            .collect(),
                        prefixes: result.prefixes,
                        is_truncated: result.is_truncated,
                        next_marker: result.next_marker,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(err) => Err(to_object_err(&err, bucket, "")),
            None => Err(StorageError::BackendDown),
        }
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        start_after: Option<String>,
    ) -> Result<ListObjectsV2Info> {
        let binding = self.binding(bucket)?;

        let mut last_err = None;
        for clnt in binding.clients.iter() {
            match clnt
                .remote
                .list_objects_v2(
                    &clnt.bucket,
                    prefix,
                    continuation_token.clone(),
                    delimiter.clone(),
                    max_keys,
                    start_after.clone(),
                )
                .await
            {
                Ok(result) => {
                    return Ok(ListObjectsV2Info {
                        objects: result
                            .objects
                            .into_iter()
                            .map(|entry| ObjectInfo::from_remote(bucket, entry, 0))
                            .collect(),
                        prefixes: result.prefixes,
                        is_truncated: result.is_truncated,
                        next_continuation_token: result.next_continuation_token,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(err) => Err(to_object_err(&err, bucket, "")),
            None => Err(StorageError::BackendDown),
        }
    }

    async fn get_object_info(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let lock = self.new_ns_lock(bucket, object).await;
        self.acquire_read(&lock, GLOBAL_OBJECT_TIMEOUT).await?;

        let result = self.get_object_info_inner(bucket, object, opts).await;
        release(&lock).await;
        result
    }

    async fn get_object_reader(
        &self,
        bucket: &str,
        object: &str,
        range: Option<HTTPRangeSpec>,
        lock_type: LockType,
        opts: &ObjectOptions,
    ) -> Result<GetObjectReader> {
        let mut held_lock = None;
        if lock_type != LockType::NoLock {
            let lock = self.new_ns_lock(bucket, object).await;
            match lock_type {
                LockType::Write => self.acquire_write(&lock, GLOBAL_OBJECT_TIMEOUT).await?,
                LockType::Read => self.acquire_read(&lock, GLOBAL_OBJECT_TIMEOUT).await?,
                LockType::NoLock => {}
            }
            held_lock = Some(lock);
        }

        let binding = self.binding(bucket)?;
        let info = self.get_object_info_inner(bucket, object, opts).await?;

        let (offset, length) = match &range {
            Some(spec) => spec.get_offset_length(info.size)?,
            None => (0, info.size),
        };

        let clnt = Arc::clone(&binding.clients[info.replica_index]);
        let get_opts = RemoteGetOptions {
            range: range.as_ref().filter(|_| length > 0).map(|_| (offset, offset + length - 1)),
            sse: opts.server_side_encryption,
        };

        // Pipe the replica body through a channel so a replica-side read
        // failure surfaces as the reader's own error.
        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(GET_PIPE_DEPTH);
        {
            let bucket = bucket.to_string();
            let object = object.to_string();
            tokio::spawn(async move {
                let mut reader = match clnt.remote.get_object(&clnt.bucket, &object, &get_opts).await {
                    Ok((reader, _)) => reader,
                    Err(err) => {
                        let _ = tx
                            .send(Err(std::io::Error::other(to_object_err(&err, &bucket, &object))))
                            .await;
                        return;
                    }
                };

                let mut chunk = vec![0u8; GET_CHUNK_SIZE];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) => return,
                        Ok(n) => {
                            if tx.send(Ok(Bytes::copy_from_slice(&chunk[..n]))).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    }
                }
            });
        }

        let stream = StreamReader::new(ReceiverStream::new(rx));
        Ok(GetObjectReader::new(Box::new(stream), info, held_lock))
    }

    async fn put_object(&self, bucket: &str, object: &str, data: PutObjReader, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let lock = self.new_ns_lock(bucket, object).await;
        self.acquire_write(&lock, GLOBAL_OBJECT_TIMEOUT).await?;

        let result = self.put_object_locked(bucket, object, data, opts).await;
        release(&lock).await;
        result
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        src_info: &mut ObjectInfo,
        src_opts: &ObjectOptions,
        dst_opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        // Same source and destination is a metadata-only update and must
        // not take the destination lock the caller already holds.
        let cp_src_dst_same = path_join(src_bucket, src_object) == path_join(dst_bucket, dst_object);
        let mut dst_lock = None;
        if !cp_src_dst_same {
            let lock = self.new_ns_lock(dst_bucket, dst_object).await;
            self.acquire_write(&lock, GLOBAL_OBJECT_TIMEOUT).await?;
            dst_lock = Some(lock);
        }

        let result = self
            .copy_object_locked(src_bucket, src_object, dst_bucket, dst_object, src_info, src_opts, dst_opts)
            .await;

        if let Some(lock) = dst_lock {
            release(&lock).await;
        }
        result
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        let lock = self.new_ns_lock(bucket, object).await;
        self.acquire_write(&lock, GLOBAL_OBJECT_TIMEOUT).await?;

        let result = self.delete_object_locked(bucket, object).await;
        release(&lock).await;
        result
    }

    async fn delete_objects(&self, bucket: &str, objects: Vec<String>) -> Result<Vec<Option<StorageError>>> {
        let lock = self.new_ns_lock(bucket, "").await;
        self.acquire_write(&lock, GLOBAL_OBJECT_TIMEOUT).await?;

        let result = self.delete_objects_locked(bucket, objects).await;
        release(&lock).await;
        result
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: i32,
    ) -> Result<ListMultipartsInfo> {
        let binding = self.binding(bucket)?;

        let mut last_err = None;
        for clnt in binding.clients.iter() {
            match clnt
                .remote
                .list_multipart_uploads(
                    &clnt.bucket,
                    prefix,
                    key_marker.clone(),
                    upload_id_marker.clone(),
                    delimiter.clone(),
                    max_uploads,
                )
                .await
            {
                Ok(result) => {
                    return Ok(ListMultipartsInfo {
                        uploads: result
                            .uploads
                            .into_iter()
                            .map(|upload| MultipartUploadInfo {
                                object: upload.key,
                                upload_id: upload.upload_id,
                                initiated: upload.initiated,
                            })
                            .collect(),
                        is_truncated: result.is_truncated,
                        next_key_marker: result.next_key_marker,
                        next_upload_id_marker: result.next_upload_id_marker,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(err) => Err(to_object_err(&err, bucket, "")),
            None => Err(StorageError::BackendDown),
        }
    }

    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<String> {
        let mut user_defined = opts.user_defined.clone();
        user_defined.insert(RADIO_TAG_KEY.to_string(), Uuid::new_v4().to_string());

        let upload_id = Uuid::new_v4().to_string();

        // Uploads of the same key proceed independently: the lock lives in
        // the upload-id namespace, not on the object itself.
        let lock = self.new_ns_lock(bucket, &path_join(object, &upload_id)).await;
        self.acquire_write(&lock, GLOBAL_OPERATION_TIMEOUT).await?;

        let result = self.new_multipart_locked(bucket, object, &upload_id, &user_defined, opts).await;
        release(&lock).await;
        result.map(|()| upload_id)
    }

    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: PutObjReader,
        opts: &ObjectOptions,
    ) -> Result<PartInfo> {
        let lock = self.new_ns_lock(bucket, &path_join(object, upload_id)).await;
        self.acquire_write(&lock, GLOBAL_OPERATION_TIMEOUT).await?;

        let result = self.put_object_part_locked(bucket, object, upload_id, part_id, data, opts).await;
        release(&lock).await;
        result
    }

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
    ) -> Result<PartInfo> {
        let lock = self.new_ns_lock(dst_bucket, &path_join(dst_object, upload_id)).await;
        self.acquire_write(&lock, GLOBAL_OPERATION_TIMEOUT).await?;

        let result = self
            .copy_object_part_locked(
                src_bucket,
                src_object,
                dst_bucket,
                dst_object,
                upload_id,
                part_id,
                start_offset,
                length,
                src_info,
                src_opts,
                dst_opts,
            )
            .await;
        release(&lock).await;
        result
    }

    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        let lock = self.new_ns_lock(bucket, &path_join(object, upload_id)).await;
        self.acquire_write(&lock, GLOBAL_OPERATION_TIMEOUT).await?;

        let result = self.abort_multipart_locked(bucket, object, upload_id).await;
        release(&lock).await;
        result
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        // The upload-id read lock permits parallel part uploads right up to
        // the call while excluding a concurrent complete; the object write
        // lock makes the finished object visible atomically.
        let upload_lock = self.new_ns_lock(bucket, &path_join(object, upload_id)).await;
        self.acquire_read(&upload_lock, GLOBAL_OPERATION_TIMEOUT).await?;

        let object_lock = self.new_ns_lock(bucket, object).await;
        if let Err(err) = self.acquire_write(&object_lock, GLOBAL_OPERATION_TIMEOUT).await {
            release(&upload_lock).await;
            return Err(err);
        }

        let result = self
            .complete_multipart_locked(bucket, object, upload_id, uploaded_parts, opts)
            .await;

        release(&object_lock).await;
        release(&upload_lock).await;
        result
    }
}

impl RadioStore {
    async fn put_object_locked(
        &self,
        bucket: &str,
        object: &str,
        data: PutObjReader,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        let binding = self.binding(bucket)?;
        let n = binding.clients.len();

        let readers = radio_streamdup::new(data.stream, n)?;

        let radio_tag = Uuid::new_v4().to_string();
        let mut user_defined = opts.user_defined.clone();
        user_defined.insert(RADIO_TAG_KEY.to_string(), radio_tag.clone());
        let remote_meta = to_remote_metadata(&user_defined);

        let put_opts = RemotePutOptions {
            user_metadata: remote_meta.clone(),
            content_type: user_defined.get(CONTENT_TYPE_KEY).cloned(),
            content_md5_base64: data.md5_base64.clone(),
            content_sha256_hex: data.sha256_hex.clone(),
            sse: opts.server_side_encryption,
        };
        let size = data.size;

        let results = join_all(binding.clients.iter().zip(readers).map(|(clnt, reader)| {
            let clnt = Arc::clone(clnt);
            let object = object.to_string();
            let put_opts = put_opts.clone();
            async move {
                clnt.remote
                    .put_object(&clnt.bucket, &object, Box::new(reader), size, &put_opts)
                    .await
            }
        }))
        .await;

        let (mut oinfos, errs) = split_results(results);
        let rindex = match reduce_write_errs(&errs) {
            (Some(rindex), _) => rindex,
            (None, Some(err)) => return Err(to_object_err(err, bucket, object)),
            (None, None) => return Err(StorageError::Unexpected),
        };

        let winner = oinfos[rindex].take().ok_or(StorageError::Unexpected)?;
        for (index, err) in errs.iter().enumerate() {
            if err.is_some() {
                self.journal_put_failure(
                    binding,
                    index,
                    rindex,
                    bucket,
                    object,
                    winner.etag.clone(),
                    Some(radio_tag.clone()),
                    remote_meta.clone(),
                    opts.server_side_encryption,
                );
            }
        }

        let mut info = ObjectInfo::from_remote(bucket, winner, rindex);
        info.name = object.to_string();
        Ok(info)
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_object_locked(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        src_info: &mut ObjectInfo,
        src_opts: &ObjectOptions,
        dst_opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        if let Some(check) = &src_opts.check_copy_precond {
            let etag = src_info.etag.clone().unwrap_or_default();
            if check(src_info, &etag) {
                return Err(StorageError::PreconditionFailed);
            }
        }

        // The metadata reaching this layer is already the resolved
        // destination metadata; pin it with REPLACE and fence the copy on
        // the source ETag so a silently diverged replica cannot satisfy it.
        src_info
            .user_defined
            .insert(METADATA_DIRECTIVE_HEADER.to_string(), "REPLACE".to_string());
        src_info.user_defined.insert(
            COPY_SOURCE_IF_MATCH_HEADER.to_string(),
            src_info.etag.clone().unwrap_or_default(),
        );
        if src_opts.server_side_encryption.is_some() || dst_opts.server_side_encryption.is_some() {
            src_info.user_defined.insert(SSE_HEADER.to_string(), "AES256".to_string());
        }

        let src_binding = self.binding(src_bucket)?;
        let dst_binding = self.binding(dst_bucket)?;
        if src_binding.clients.len() != dst_binding.clients.len() {
            return Err(StorageError::Unexpected);
        }
        let n = src_binding.clients.len();

        let headers = src_info.user_defined.clone();
        let results = join_all((0..n).map(|index| {
            let src_clnt = Arc::clone(&src_binding.clients[index]);
            let dst_remote_bucket = dst_binding.clients[index].bucket.clone();
            let src_object = src_object.to_string();
            let dst_object = dst_object.to_string();
            let headers = headers.clone();
            async move {
                src_clnt
                    .remote
                    .copy_object(&src_clnt.bucket, &src_object, &dst_remote_bucket, &dst_object, &headers)
                    .await
            }
        }))
        .await;

        let (_, errs) = split_results(results);
        let rindex = match reduce_write_errs(&errs) {
            (Some(rindex), _) => rindex,
            (None, Some(err)) => return Err(to_object_err(err, src_bucket, src_object)),
            (None, None) => return Err(StorageError::Unexpected),
        };

        let dst_result = self.get_object_info_inner(dst_bucket, dst_object, dst_opts).await;
        let radio_tag = dst_result
            .as_ref()
            .ok()
            .and_then(|info| info.radio_tag().map(str::to_string));

        for (index, err) in errs.iter().enumerate() {
            if err.is_some() {
                let clnt = &src_binding.clients[index];
                let mut entry = JournalEntry::new(JournalOp::CopyObject, src_bucket, src_object, &clnt.bucket, &clnt.id);
                entry.dst_bucket = Some(dst_bucket.to_string());
                entry.dst_object = Some(dst_object.to_string());
                entry.src_client_id = src_binding.clients[rindex].id.clone();
                entry.radio_tag = radio_tag.clone();
                self.heal.send(entry);
            }
        }

        dst_result
    }

    async fn delete_object_locked(&self, bucket: &str, object: &str) -> Result<()> {
        let binding = self.binding(bucket)?;

        let results = join_all(binding.clients.iter().map(|clnt| {
            let clnt = Arc::clone(clnt);
            let object = object.to_string();
            async move { clnt.remote.remove_object(&clnt.bucket, &object).await }
        }))
        .await;

        let (_, errs) = split_results(results);
        let rindex = match reduce_write_errs(&errs) {
            (Some(rindex), _) => rindex,
            (None, Some(err)) => return Err(to_object_err(err, bucket, object)),
            (None, None) => return Err(StorageError::Unexpected),
        };

        for (index, err) in errs.iter().enumerate() {
            if err.is_some() {
                let clnt = &binding.clients[index];
                let mut entry = JournalEntry::new(JournalOp::DeleteObject, bucket, object, &clnt.bucket, &clnt.id);
                entry.src_client_id = binding.clients[rindex].id.clone();
                self.heal.send(entry);
            }
        }

        Ok(())
    }

    async fn delete_objects_locked(&self, bucket: &str, objects: Vec<String>) -> Result<Vec<Option<StorageError>>> {
        let binding = self.binding(bucket)?;
        let n = binding.clients.len();
        let mut errs: Vec<Option<StorageError>> = objects.iter().map(|_| None).collect();

        let mut error_streams = Vec::with_capacity(n);
        let mut offlines = Vec::with_capacity(n);
        for clnt in binding.clients.iter() {
            let (tx, rx) = mpsc::channel(16);
            let names = objects.clone();
            tokio::spawn(async move {
                for name in names {
                    if tx.send(name).await.is_err() {
                        return;
                    }
                }
            });
            error_streams.push(clnt.remote.remove_objects(&clnt.bucket, rx).await);
            offlines.push(clnt.is_offline());
        }

        let drained: Vec<Vec<radio_remote::RemoveObjectError>> = join_all(error_streams.into_iter().map(|mut rx| async move {
            let mut collected = Vec::new();
            while let Some(failure) = rx.recv().await {
                collected.push(failure);
            }
            collected
        }))
        .await;

        let mut per_object: HashMap<String, Vec<Option<RemoteError>>> = HashMap::new();
        for (index, failures) in drained.into_iter().enumerate() {
            for failure in failures {
                let slots = per_object
                    .entry(failure.object)
                    .or_insert_with(|| (0..n).map(|_| None).collect());
                slots[index] = Some(failure.error);
            }
        }

        for (object_name, replica_errs) in per_object.iter() {
            let (rindex, first_err) = reduce_write_errs(replica_errs);
            match rindex {
                Some(rindex) => {
                    for (index, err) in replica_errs.iter().enumerate() {
                        if err.is_some() {
                            let clnt = &binding.clients[index];
                            let mut entry =
                                JournalEntry::new(JournalOp::DeleteObject, bucket, object_name, &clnt.bucket, &clnt.id);
                            entry.src_client_id = binding.clients[rindex].id.clone();
                            self.heal.send(entry);
                        }
                    }
                }
                None => {
                    if let (Some(err), Some(pos)) = (first_err, objects.iter().position(|o| o == object_name)) {
                        errs[pos] = Some(to_object_err(err, bucket, object_name));
                    }
                }
            }
        }

        // An offline replica saw none of the batch; journal every object so
        // it converges when it returns.
        for (index, offline) in offlines.iter().enumerate() {
            if *offline {
                let clnt = &binding.clients[index];
                for object_name in objects.iter() {
                    self.heal
                        .send(JournalEntry::new(JournalOp::DeleteObject, bucket, object_name, &clnt.bucket, &clnt.id));
                }
            }
        }

        Ok(errs)
    }

    async fn new_multipart_locked(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        user_defined: &HashMap<String, String>,
        opts: &ObjectOptions,
    ) -> Result<()> {
        let binding = self.binding(bucket)?;

        let put_opts = RemotePutOptions {
            user_metadata: to_remote_metadata(user_defined),
            content_type: user_defined.get(CONTENT_TYPE_KEY).cloned(),
            sse: opts.server_side_encryption,
            ..Default::default()
        };

        let mut backend_ids = Vec::with_capacity(binding.clients.len());
        for clnt in binding.clients.iter() {
            match clnt.remote.new_multipart_upload(&clnt.bucket, object, &put_opts).await {
                Ok(id) => backend_ids.push(id),
                Err(err) => {
                    // Best-effort cleanup on the replica that failed; no
                    // acknowledgment is returned for a partial init.
                    let _ = clnt.remote.abort_multipart_upload(&clnt.bucket, object, upload_id).await;
                    return Err(to_object_err(&err, bucket, object));
                }
            }
        }

        self.uploads.insert(upload_id, backend_ids).await;
        Ok(())
    }

    async fn put_object_part_locked(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: PutObjReader,
        opts: &ObjectOptions,
    ) -> Result<PartInfo> {
        let Some(backend_ids) = self.uploads.get(upload_id).await else {
            return Err(StorageError::InvalidUploadId(
                bucket.to_string(),
                object.to_string(),
                upload_id.to_string(),
            ));
        };

        let binding = self.binding(bucket)?;
        let n = binding.clients.len();
        let readers = radio_streamdup::new(data.stream, n)?;

        let put_opts = RemotePutOptions {
            content_md5_base64: data.md5_base64.clone(),
            content_sha256_hex: data.sha256_hex.clone(),
            sse: opts.server_side_encryption,
            ..Default::default()
        };
        let size = data.size;

        let results = join_all(
            binding
                .clients
                .iter()
                .zip(readers)
                .zip(backend_ids.iter())
                .map(|((clnt, reader), backend_id)| {
                    let clnt = Arc::clone(clnt);
                    let object = object.to_string();
                    let backend_id = backend_id.clone();
                    let put_opts = put_opts.clone();
                    async move {
                        clnt.remote
                            .put_object_part(&clnt.bucket, &object, &backend_id, part_id, Box::new(reader), size, &put_opts)
                            .await
                    }
                }),
        )
        .await;

        let (mut parts, errs) = split_results(results);
        let rindex = match reduce_write_errs(&errs) {
            (Some(rindex), _) => rindex,
            (None, Some(err)) => return Err(to_object_err(err, bucket, object)),
            (None, None) => return Err(StorageError::Unexpected),
        };

        let winner = parts[rindex].take().ok_or(StorageError::Unexpected)?;
        Ok(PartInfo {
            part_number: winner.part_number,
            etag: winner.etag,
            size: winner.size,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_object_part_locked(
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
    ) -> Result<PartInfo> {
        if let Some(check) = &src_opts.check_copy_precond {
            let etag = src_info.etag.clone().unwrap_or_default();
            if check(src_info, &etag) {
                return Err(StorageError::PreconditionFailed);
            }
        }

        let Some(backend_ids) = self.uploads.get(upload_id).await else {
            return Err(StorageError::InvalidUploadId(
                src_bucket.to_string(),
                src_object.to_string(),
                upload_id.to_string(),
            ));
        };

        let mut headers = HashMap::new();
        headers.insert(
            COPY_SOURCE_IF_MATCH_HEADER.to_string(),
            src_info.etag.clone().unwrap_or_default(),
        );
        if src_opts.server_side_encryption.is_some() || dst_opts.server_side_encryption.is_some() {
            headers.insert(SSE_HEADER.to_string(), "AES256".to_string());
        }

        let src_binding = self.binding(src_bucket)?;
        let dst_binding = self.binding(dst_bucket)?;
        if src_binding.clients.len() != dst_binding.clients.len() {
            return Err(StorageError::Unexpected);
        }
        let n = src_binding.clients.len();

        let results = join_all((0..n).map(|index| {
            let src_clnt = Arc::clone(&src_binding.clients[index]);
            let dst_remote_bucket = dst_binding.clients[index].bucket.clone();
            let src_object = src_object.to_string();
            let dst_object = dst_object.to_string();
            let backend_id = backend_ids[index].clone();
            let headers = headers.clone();
            async move {
                src_clnt
                    .remote
                    .copy_object_part(
                        &src_clnt.bucket,
                        &src_object,
                        &dst_remote_bucket,
                        &dst_object,
                        &backend_id,
                        part_id,
                        start_offset,
                        length,
                        &headers,
                    )
                    .await
            }
        }))
        .await;

        let (mut parts, errs) = split_results(results);
        let rindex = match reduce_write_errs(&errs) {
            (Some(rindex), _) => rindex,
            (None, Some(err)) => return Err(to_object_err(err, src_bucket, src_object)),
            (None, None) => return Err(StorageError::Unexpected),
        };

        let winner = parts[rindex].take().ok_or(StorageError::Unexpected)?;
        Ok(PartInfo {
            part_number: winner.part_number,
            etag: Some(winner.etag),
            size: length,
        })
    }

    async fn abort_multipart_locked(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        let Some(backend_ids) = self.uploads.get(upload_id).await else {
            return Err(StorageError::InvalidUploadId(
                bucket.to_string(),
                object.to_string(),
                upload_id.to_string(),
            ));
        };

        let binding = self.binding(bucket)?;
        for (clnt, backend_id) in binding.clients.iter().zip(backend_ids.iter()) {
            clnt.remote
                .abort_multipart_upload(&clnt.bucket, object, backend_id)
                .await
                .map_err(|err| to_object_err(&err, bucket, object))?;
        }

        self.uploads.remove(upload_id).await;
        Ok(())
    }

    async fn complete_multipart_locked(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        let Some(backend_ids) = self.uploads.get(upload_id).await else {
            return Err(StorageError::InvalidUploadId(
                bucket.to_string(),
                object.to_string(),
                upload_id.to_string(),
            ));
        };

        let binding = self.binding(bucket)?;
        let n = binding.clients.len();

        let mut etags: Vec<Option<String>> = (0..n).map(|_| None).collect();
        let mut errs: Vec<Option<RemoteError>> = (0..n).map(|_| None).collect();
        for (index, (clnt, backend_id)) in binding.clients.iter().zip(backend_ids.iter()).enumerate() {
            match clnt
                .remote
                .complete_multipart_upload(&clnt.bucket, object, backend_id, &uploaded_parts)
                .await
            {
                Ok(info) => etags[index] = info.etag,
                Err(err) => errs[index] = Some(err),
            }
        }

        let rindex = match reduce_write_errs(&errs) {
            (Some(rindex), _) => rindex,
            (None, Some(err)) => return Err(to_object_err(err, bucket, object)),
            (None, None) => return Err(StorageError::Unexpected),
        };

        self.uploads.remove(upload_id).await;

        let has_err = errs.iter().any(Option::is_some);
        let mut radio_tag = None;
        let mut user_meta = HashMap::new();
        let mut sse = None;
        if has_err {
            // The failed replica never materialized the object; the replay
            // needs the surviving replica's tag and encryption marker.
            if let Ok(info) = self.get_object_info_inner(bucket, object, opts).await {
                radio_tag = info.radio_tag().map(str::to_string);
                user_meta = to_remote_metadata(&info.user_defined);
                sse = info.sse;
            }
        }

        for (index, err) in errs.iter().enumerate() {
            if err.is_some() {
                self.journal_put_failure(
                    binding,
                    index,
                    rindex,
                    bucket,
                    object,
                    etags[rindex].clone(),
                    radio_tag.clone(),
                    user_meta.clone(),
                    sse,
                );
            }
        }

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            name: object.to_string(),
            etag: etags[rindex].clone(),
            replica_index: rindex,
            ..Default::default()
        })
    }
}

impl ClientLookup for RadioStore {
    fn client(&self, id: &str) -> Option<Arc<ReplicaClient>> {
        for binding in self.mirror_clients.values() {
            for clnt in binding.clients.iter() {
                if clnt.id == id {
                    return Some(Arc::clone(clnt));
                }
            }
        }
        None
    }

    fn remote_bucket(&self, logical_bucket: &str, id: &str) -> Option<String> {
        self.mirror_clients
            .get(logical_bucket)?
            .clients
            .iter()
            .find(|clnt| clnt.id == id)
            .map(|clnt| clnt.bucket.clone())
    }
}
