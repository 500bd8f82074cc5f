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

//! End-to-end pipeline tests over in-memory replicas.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use radio::storage::api::{CompletePart, HTTPRangeSpec, LockType, ObjectLayer, ObjectOptions, PutObjReader};
use radio::storage::error::StorageError;
use radio::storage::radio::{MirrorBinding, RadioStore};
use radio_heal::{ClientLookup, HealSys, JournalEntry, JournalOp};
use radio_remote::{
    RemoteApi, RemoteError, RemoteGetOptions, RemoteListMultipartUploads, RemoteListObjects, RemoteListObjectsV2,
    RemoteMultipartUpload, RemoteObjectInfo, RemotePart, RemotePutOptions, RemoteReader, RemoteStatOptions,
    RemoveObjectError, ReplicaClient,
};

const BUCKET: &str = "b";
const REMOTE_A: &str = "data-a";
const REMOTE_B: &str = "data-b";

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    metadata: HashMap<String, String>,
    etag: String,
    content_type: Option<String>,
}

struct MemUpload {
    bucket: String,
    key: String,
    metadata: HashMap<String, String>,
    content_type: Option<String>,
    parts: BTreeMap<usize, (Vec<u8>, String)>,
}

#[derive(Default)]
struct MemState {
    objects: HashMap<String, HashMap<String, StoredObject>>,
    uploads: HashMap<String, MemUpload>,
}

#[derive(Clone)]
struct MemRemote {
    state: Arc<Mutex<MemState>>,
    fail_puts: Arc<AtomicBool>,
    fail_completes: Arc<AtomicBool>,
    fail_removes: Arc<AtomicBool>,
}

impl MemRemote {
    fn new(buckets: &[&str]) -> Self {
        let mut state = MemState::default();
        for bucket in buckets {
            state.objects.insert(bucket.to_string(), HashMap::new());
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            fail_puts: Arc::new(AtomicBool::new(false)),
            fail_completes: Arc::new(AtomicBool::new(false)),
            fail_removes: Arc::new(AtomicBool::new(false)),
        }
    }

    fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    fn fail_completes(&self, fail: bool) {
        self.fail_completes.store(fail, Ordering::SeqCst);
    }

    fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(bucket)?.get(key).cloned()
    }

    fn put_direct(&self, bucket: &str, key: &str, data: &[u8], metadata: HashMap<String, String>) {
        let etag = format!("{:x}", md5::compute(data));
        self.state.lock().unwrap().objects.get_mut(bucket).unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                metadata,
                etag,
                content_type: None,
            },
        );
    }

    fn has_upload(&self, upload_id: &str) -> bool {
        self.state.lock().unwrap().uploads.contains_key(upload_id)
    }

    fn info_of(&self, key: &str, stored: &StoredObject) -> RemoteObjectInfo {
        RemoteObjectInfo {
            key: key.to_string(),
            size: stored.data.len() as i64,
            etag: Some(stored.etag.clone()),
            content_type: stored.content_type.clone(),
            user_metadata: stored.metadata.clone(),
            sse: None,
            last_modified: None,
        }
    }
}

async fn read_all(mut reader: RemoteReader) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    Ok(data)
}

fn internal_error(op: &str) -> RemoteError {
    RemoteError::Api {
        code: "InternalError".to_string(),
        message: format!("injected {op} failure"),
    }
}

#[async_trait]
impl RemoteApi for MemRemote {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        Ok(self.state.lock().unwrap().objects.contains_key(bucket))
    }

    async fn stat_object(&self, bucket: &str, object: &str, _opts: &RemoteStatOptions) -> Result<RemoteObjectInfo, RemoteError> {
        let stored = self
            .object(bucket, object)
            .ok_or_else(|| RemoteError::ObjectNotFound(format!("{bucket}/{object}")))?;
        Ok(self.info_of(object, &stored))
    }

    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        opts: &RemoteGetOptions,
    ) -> Result<(RemoteReader, RemoteObjectInfo), RemoteError> {
        let stored = self
            .object(bucket, object)
            .ok_or_else(|| RemoteError::ObjectNotFound(format!("{bucket}/{object}")))?;
        let info = self.info_of(object, &stored);

        let data = match opts.range {
            Some((start, end)) => {
                let start = start.max(0) as usize;
                let end = ((end + 1) as usize).min(stored.data.len());
                stored.data[start..end].to_vec()
            }
            None => stored.data,
        };

        Ok((Box::new(std::io::Cursor::new(data)), info))
    }

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: RemoteReader,
        _size: i64,
        opts: &RemotePutOptions,
    ) -> Result<RemoteObjectInfo, RemoteError> {
        let payload = read_all(data).await?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(internal_error("put"));
        }

        let etag = format!("{:x}", md5::compute(&payload));
        let stored = StoredObject {
            data: payload,
            metadata: opts.user_metadata.clone(),
            etag: etag.clone(),
            content_type: opts.content_type.clone(),
        };

        let mut state = self.state.lock().unwrap();
        let objects = state
            .objects
            .get_mut(bucket)
            .ok_or_else(|| RemoteError::BucketNotFound(bucket.to_string()))?;
        let size = stored.data.len() as i64;
        let info = RemoteObjectInfo {
            key: object.to_string(),
            size,
            etag: Some(etag),
            content_type: stored.content_type.clone(),
            user_metadata: stored.metadata.clone(),
            sse: None,
            last_modified: None,
        };
        objects.insert(object.to_string(), stored);
        Ok(info)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_object: &str,
        dst_bucket: &str,
        dst_object: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RemoteObjectInfo, RemoteError> {
        let src = self
            .object(src_bucket, src_object)
            .ok_or_else(|| RemoteError::ObjectNotFound(format!("{src_bucket}/{src_object}")))?;

        if let Some(expected) = headers.get("x-amz-copy-source-if-match") {
            if !expected.is_empty() && *expected != src.etag {
                return Err(RemoteError::PreconditionFailed);
            }
        }

        let replace = headers
            .get("x-amz-metadata-directive")
            .map(|d| d.eq_ignore_ascii_case("replace"))
            .unwrap_or(false);
        let metadata = if replace {
            let mut out = HashMap::new();
            for (key, value) in headers {
                if let Some(bare) = key.to_ascii_lowercase().strip_prefix("x-amz-meta-") {
                    out.insert(bare.to_string(), value.clone());
                }
            }
            out
        } else {
            src.metadata.clone()
        };

        let stored = StoredObject {
            data: src.data.clone(),
            metadata,
            etag: src.etag.clone(),
            content_type: src.content_type.clone(),
        };
        let info = self.info_of(dst_object, &stored);

        let mut state = self.state.lock().unwrap();
        let objects = state
            .objects
            .get_mut(dst_bucket)
            .ok_or_else(|| RemoteError::BucketNotFound(dst_bucket.to_string()))?;
        objects.insert(dst_object.to_string(), stored);
        Ok(info)
    }

    async fn remove_object(&self, bucket: &str, object: &str) -> Result<(), RemoteError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(internal_error("remove"));
        }
        if let Some(objects) = self.state.lock().unwrap().objects.get_mut(bucket) {
            objects.remove(object);
        }
        Ok(())
    }

    async fn remove_objects(&self, bucket: &str, mut objects: mpsc::Receiver<String>) -> mpsc::Receiver<RemoveObjectError> {
        let (tx, rx) = mpsc::channel(16);
        let this = self.clone();
        let bucket = bucket.to_string();
        tokio::spawn(async move {
            while let Some(name) = objects.recv().await {
                if this.fail_removes.load(Ordering::SeqCst) {
                    let _ = tx
                        .send(RemoveObjectError {
                            object: name,
                            error: internal_error("remove"),
                        })
                        .await;
                    continue;
                }
                if let Some(map) = this.state.lock().unwrap().objects.get_mut(&bucket) {
                    map.remove(&name);
                }
            }
        });
        rx
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        _marker: Option<String>,
        _delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<RemoteListObjects, RemoteError> {
        let state = self.state.lock().unwrap();
        let objects = state
            .objects
            .get(bucket)
            .ok_or_else(|| RemoteError::BucketNotFound(bucket.to_string()))?;

        let mut keys: Vec<&String> = objects.keys().filter(|key| key.starts_with(prefix)).collect();
        keys.sort();

        Ok(RemoteListObjects {
            objects: keys
                .into_iter()
                .take(max_keys.max(0) as usize)
                .map(|key| self.info_of(key, &objects[key]))
                .collect(),
            ..Default::default()
        })
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        _continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        _start_after: Option<String>,
    ) -> Result<RemoteListObjectsV2, RemoteError> {
        let listed = self.list_objects(bucket, prefix, None, delimiter, max_keys).await?;
        Ok(RemoteListObjectsV2 {
            objects: listed.objects,
            prefixes: listed.prefixes,
            is_truncated: listed.is_truncated,
            next_continuation_token: None,
        })
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        _key_marker: Option<String>,
        _upload_id_marker: Option<String>,
        _delimiter: Option<String>,
        _max_uploads: i32,
    ) -> Result<RemoteListMultipartUploads, RemoteError> {
        let state = self.state.lock().unwrap();
        let uploads = state
            .uploads
            .iter()
            .filter(|(_, upload)| upload.bucket == bucket && upload.key.starts_with(prefix))
            .map(|(id, upload)| RemoteMultipartUpload {
                key: upload.key.clone(),
                upload_id: id.clone(),
                initiated: None,
            })
            .collect();
        Ok(RemoteListMultipartUploads {
            uploads,
            ..Default::default()
        })
    }

    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &RemotePutOptions) -> Result<String, RemoteError> {
        let id = Uuid::new_v4().to_string();
        self.state.lock().unwrap().uploads.insert(
            id.clone(),
            MemUpload {
                bucket: bucket.to_string(),
                key: object.to_string(),
                metadata: opts.user_metadata.clone(),
                content_type: opts.content_type.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn put_object_part(
        &self,
        _bucket: &str,
        _object: &str,
        upload_id: &str,
        part_number: usize,
        data: RemoteReader,
        _size: i64,
        _opts: &RemotePutOptions,
    ) -> Result<RemotePart, RemoteError> {
        let payload = read_all(data).await?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(internal_error("put part"));
        }

        let etag = format!("{:x}", md5::compute(&payload));
        let size = payload.len() as i64;

        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| RemoteError::UploadNotFound(upload_id.to_string()))?;
        upload.parts.insert(part_number, (payload, etag.clone()));

        Ok(RemotePart {
            part_number,
            etag: Some(etag),
            size,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_object_part(
        &self,
        src_bucket: &str,
        src_object: &str,
        _dst_bucket: &str,
        _dst_object: &str,
        upload_id: &str,
        part_number: usize,
        start_offset: i64,
        length: i64,
        _headers: &HashMap<String, String>,
    ) -> Result<radio_remote::CompletePart, RemoteError> {
        let src = self
            .object(src_bucket, src_object)
            .ok_or_else(|| RemoteError::ObjectNotFound(format!("{src_bucket}/{src_object}")))?;

        let data = if length > 0 {
            let start = start_offset.max(0) as usize;
            let end = (start + length as usize).min(src.data.len());
            src.data[start..end].to_vec()
        } else {
            src.data
        };
        let etag = format!("{:x}", md5::compute(&data));

        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| RemoteError::UploadNotFound(upload_id.to_string()))?;
        upload.parts.insert(part_number, (data, etag.clone()));

        Ok(radio_remote::CompletePart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[radio_remote::CompletePart],
    ) -> Result<RemoteObjectInfo, RemoteError> {
        if self.fail_completes.load(Ordering::SeqCst) {
            return Err(internal_error("complete"));
        }

        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| RemoteError::UploadNotFound(upload_id.to_string()))?;

        let mut data = Vec::new();
        for part in parts {
            let (payload, _) = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| RemoteError::Other(format!("missing part {}", part.part_number)))?;
            data.extend_from_slice(payload);
        }

        let etag = format!("{:x}-{}", md5::compute(&data), parts.len());
        let stored = StoredObject {
            data,
            metadata: upload.metadata.clone(),
            etag: etag.clone(),
            content_type: upload.content_type.clone(),
        };
        let size = stored.data.len() as i64;
        let metadata = stored.metadata.clone();

        state
            .objects
            .get_mut(bucket)
            .ok_or_else(|| RemoteError::BucketNotFound(bucket.to_string()))?
            .insert(object.to_string(), stored);

        Ok(RemoteObjectInfo {
            key: object.to_string(),
            size,
            etag: Some(etag),
            content_type: None,
            user_metadata: metadata,
            sse: None,
            last_modified: None,
        })
    }

    async fn abort_multipart_upload(&self, _bucket: &str, _object: &str, upload_id: &str) -> Result<(), RemoteError> {
        self.state.lock().unwrap().uploads.remove(upload_id);
        Ok(())
    }
}

struct TestEnv {
    store: Arc<RadioStore>,
    heal: Arc<HealSys>,
    r0: MemRemote,
    r1: MemRemote,
    clients: Vec<Arc<ReplicaClient>>,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let heal = HealSys::new(dir.path(), cancel.clone());

    let r0 = MemRemote::new(&[REMOTE_A]);
    let r1 = MemRemote::new(&[REMOTE_B]);
    let clients = vec![
        Arc::new(ReplicaClient::new(Arc::new(r0.clone()), REMOTE_A, "replica-0-id")),
        Arc::new(ReplicaClient::new(Arc::new(r1.clone()), REMOTE_B, "replica-1-id")),
    ];

    let mut bindings = HashMap::new();
    bindings.insert(
        BUCKET.to_string(),
        MirrorBinding {
            clients: clients.clone(),
        },
    );

    let store = RadioStore::new(bindings, Vec::new(), "node-test".to_string(), Arc::clone(&heal));

    TestEnv {
        store,
        heal,
        r0,
        r1,
        clients,
        cancel,
        _dir: dir,
    }
}

async fn wait_for_journal(env: &TestEnv, replica_bucket: &str, object: &str) -> JournalEntry {
    for _ in 0..200 {
        if let Some(entry) = env.heal.read_latest(replica_bucket, BUCKET, object).await {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("journal entry for {object} on {replica_bucket} never appeared");
}

async fn gateway_get(env: &TestEnv, object: &str) -> Result<Vec<u8>, StorageError> {
    let mut reader = env
        .store
        .get_object_reader(BUCKET, object, None, LockType::Read, &ObjectOptions::default())
        .await?;
    reader.read_all().await
}

#[tokio::test]
async fn test_happy_put_then_get() {
    let env = setup().await;

    let body = vec![0x41u8; 1024];
    let info = env
        .store
        .put_object(BUCKET, "k", PutObjReader::from_vec(body.clone()), &ObjectOptions::default())
        .await
        .unwrap();
    assert!(info.etag.is_some());

    let a = env.r0.object(REMOTE_A, "k").unwrap();
    let b = env.r1.object(REMOTE_B, "k").unwrap();
    assert_eq!(a.data, body);
    assert_eq!(b.data, body);

    let tag_a = a.metadata.get("radio-tag").unwrap();
    let tag_b = b.metadata.get("radio-tag").unwrap();
    assert_eq!(tag_a, tag_b);
    assert!(Uuid::parse_str(tag_a).is_ok());

    assert_eq!(gateway_get(&env, "k").await.unwrap(), body);
    assert!(env.heal.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ranged_get() {
    let env = setup().await;

    let body: Vec<u8> = (0..100u8).collect();
    env.store
        .put_object(BUCKET, "ranged", PutObjReader::from_vec(body.clone()), &ObjectOptions::default())
        .await
        .unwrap();

    let range = HTTPRangeSpec {
        is_suffix_length: false,
        start: 10,
        end: 19,
    };
    let mut reader = env
        .store
        .get_object_reader(BUCKET, "ranged", Some(range), LockType::Read, &ObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(reader.read_all().await.unwrap(), body[10..20].to_vec());
}

#[tokio::test]
async fn test_put_journals_failed_replica_then_heals() {
    let env = setup().await;

    env.r1.fail_puts(true);
    let body = vec![0x42u8; 10];
    env.store
        .put_object(BUCKET, "k2", PutObjReader::from_vec(body.clone()), &ObjectOptions::default())
        .await
        .unwrap();

    let entry = wait_for_journal(&env, REMOTE_B, "k2").await;
    assert_eq!(entry.op, JournalOp::PutObject);
    assert_eq!(entry.err_client_id, "replica-1-id");
    assert_eq!(entry.src_client_id, "replica-0-id");
    assert_eq!(entry.etag, env.r0.object(REMOTE_A, "k2").map(|o| o.etag));
    assert!(entry.radio_tag.is_some());

    assert!(env.r1.object(REMOTE_B, "k2").is_none());

    env.r1.fail_puts(false);
    let healed = env.heal.replay(env.store.as_ref() as &dyn ClientLookup).await;
    assert_eq!(healed, 1);

    assert!(env.heal.read_latest(REMOTE_B, BUCKET, "k2").await.is_none());
    let replayed = env.r1.object(REMOTE_B, "k2").unwrap();
    assert_eq!(replayed.data, body);
    assert_eq!(replayed.metadata.get("radio-tag"), entry.radio_tag.as_ref());
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    let env = setup().await;

    env.r1.fail_puts(true);
    env.store
        .put_object(BUCKET, "k3", PutObjReader::from_vec(vec![1, 2, 3]), &ObjectOptions::default())
        .await
        .unwrap();
    wait_for_journal(&env, REMOTE_B, "k3").await;
    env.r1.fail_puts(false);

    assert_eq!(env.heal.replay(env.store.as_ref() as &dyn ClientLookup).await, 1);
    assert_eq!(env.heal.replay(env.store.as_ref() as &dyn ClientLookup).await, 0);
    assert_eq!(env.r1.object(REMOTE_B, "k3").unwrap().data, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_read_skips_journaled_replica() {
    let env = setup().await;

    env.r0.put_direct(REMOTE_A, "skewed", b"stale", HashMap::new());
    env.r1.put_direct(REMOTE_B, "skewed", b"fresh", HashMap::new());

    let entry = JournalEntry::new(JournalOp::PutObject, BUCKET, "skewed", REMOTE_A, "replica-0-id");
    env.heal.send(entry);
    wait_for_journal(&env, REMOTE_A, "skewed").await;

    let info = env
        .store
        .get_object_info(BUCKET, "skewed", &ObjectOptions::default())
        .await
        .unwrap();
    assert_eq!(info.replica_index, 1);
    assert_eq!(gateway_get(&env, "skewed").await.unwrap(), b"fresh".to_vec());
}

#[tokio::test]
async fn test_both_replicas_failing_surfaces_error() {
    let env = setup().await;
    env.r0.fail_puts(true);
    env.r1.fail_puts(true);

    let err = env
        .store
        .put_object(BUCKET, "doomed", PutObjReader::from_vec(vec![9]), &ObjectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Remote(_)));
}

#[tokio::test]
async fn test_get_missing_object() {
    let env = setup().await;
    let err = gateway_get(&env, "absent").await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectNotFound(_, _)));
}

#[tokio::test]
async fn test_all_replicas_ineligible_is_backend_down() {
    let env = setup().await;
    env.clients[0].set_online(false);
    env.clients[1].set_online(false);

    let err = env
        .store
        .get_object_info(BUCKET, "whatever", &ObjectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BackendDown));
}

#[tokio::test]
async fn test_copy_same_key_updates_metadata_everywhere() {
    let env = setup().await;

    env.store
        .put_object(BUCKET, "meta", PutObjReader::from_vec(b"payload".to_vec()), &ObjectOptions::default())
        .await
        .unwrap();
    let etag_before = env.r0.object(REMOTE_A, "meta").unwrap().etag;

    let mut src_info = env
        .store
        .get_object_info(BUCKET, "meta", &ObjectOptions::default())
        .await
        .unwrap();
    src_info
        .user_defined
        .insert("x-amz-meta-color".to_string(), "green".to_string());

    env.store
        .copy_object(
            BUCKET,
            "meta",
            BUCKET,
            "meta",
            &mut src_info,
            &ObjectOptions::default(),
            &ObjectOptions::default(),
        )
        .await
        .unwrap();

    let a = env.r0.object(REMOTE_A, "meta").unwrap();
    let b = env.r1.object(REMOTE_B, "meta").unwrap();
    assert_eq!(a.metadata.get("color").map(String::as_str), Some("green"));
    assert_eq!(b.metadata.get("color").map(String::as_str), Some("green"));
    assert_eq!(a.etag, etag_before);
    assert_eq!(b.etag, etag_before);
}

#[tokio::test]
async fn test_copy_precondition_failure_mutates_nothing() {
    let env = setup().await;

    env.store
        .put_object(BUCKET, "guarded", PutObjReader::from_vec(b"original".to_vec()), &ObjectOptions::default())
        .await
        .unwrap();

    // The front-end's precondition callback fires before any replica is
    // touched.
    let mut src_info = env
        .store
        .get_object_info(BUCKET, "guarded", &ObjectOptions::default())
        .await
        .unwrap();
    let src_opts = ObjectOptions {
        check_copy_precond: Some(Arc::new(|_, _| true)),
        ..Default::default()
    };
    let err = env
        .store
        .copy_object(
            BUCKET,
            "guarded",
            BUCKET,
            "guarded-copy",
            &mut src_info,
            &src_opts,
            &ObjectOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PreconditionFailed));
    assert!(env.r0.object(REMOTE_A, "guarded-copy").is_none());
    assert!(env.r1.object(REMOTE_B, "guarded-copy").is_none());

    // A stale source ETag trips the replica-side if-match fence instead.
    let mut stale_info = env
        .store
        .get_object_info(BUCKET, "guarded", &ObjectOptions::default())
        .await
        .unwrap();
    stale_info.etag = Some("wrong-etag".to_string());
    let err = env
        .store
        .copy_object(
            BUCKET,
            "guarded",
            BUCKET,
            "guarded-copy",
            &mut stale_info,
            &ObjectOptions::default(),
            &ObjectOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PreconditionFailed));
    assert!(env.r0.object(REMOTE_A, "guarded-copy").is_none());
    assert!(env.r1.object(REMOTE_B, "guarded-copy").is_none());
}

#[tokio::test]
async fn test_delete_object_journals_failed_replica() {
    let env = setup().await;

    env.store
        .put_object(BUCKET, "gone", PutObjReader::from_vec(vec![5; 5]), &ObjectOptions::default())
        .await
        .unwrap();

    env.r1.fail_removes(true);
    env.store.delete_object(BUCKET, "gone").await.unwrap();

    assert!(env.r0.object(REMOTE_A, "gone").is_none());
    let entry = wait_for_journal(&env, REMOTE_B, "gone").await;
    assert_eq!(entry.op, JournalOp::DeleteObject);
    assert_eq!(entry.err_client_id, "replica-1-id");
    assert_eq!(entry.src_client_id, "replica-0-id");

    env.r1.fail_removes(false);
    assert_eq!(env.heal.replay(env.store.as_ref() as &dyn ClientLookup).await, 1);
    assert!(env.r1.object(REMOTE_B, "gone").is_none());
}

#[tokio::test]
async fn test_batch_delete_journals_offline_replica() {
    let env = setup().await;

    for name in ["d1", "d2"] {
        env.store
            .put_object(BUCKET, name, PutObjReader::from_vec(vec![7; 7]), &ObjectOptions::default())
            .await
            .unwrap();
    }

    env.clients[1].set_online(false);
    let errs = env
        .store
        .delete_objects(BUCKET, vec!["d1".to_string(), "d2".to_string()])
        .await
        .unwrap();
    assert!(errs.iter().all(Option::is_none));

    for name in ["d1", "d2"] {
        let entry = wait_for_journal(&env, REMOTE_B, name).await;
        assert_eq!(entry.op, JournalOp::DeleteObject);
        assert_eq!(entry.err_client_id, "replica-1-id");
    }
}

#[tokio::test]
async fn test_multipart_happy_path() {
    let env = setup().await;

    let upload_id = env
        .store
        .new_multipart_upload(BUCKET, "big", &ObjectOptions::default())
        .await
        .unwrap();

    let part1 = env
        .store
        .put_object_part(BUCKET, "big", &upload_id, 1, PutObjReader::from_vec(vec![1; 64]), &ObjectOptions::default())
        .await
        .unwrap();
    let part2 = env
        .store
        .put_object_part(BUCKET, "big", &upload_id, 2, PutObjReader::from_vec(vec![2; 64]), &ObjectOptions::default())
        .await
        .unwrap();

    let parts = vec![
        CompletePart {
            part_number: 1,
            etag: part1.etag.clone().unwrap(),
        },
        CompletePart {
            part_number: 2,
            etag: part2.etag.clone().unwrap(),
        },
    ];
    let info = env
        .store
        .complete_multipart_upload(BUCKET, "big", &upload_id, parts, &ObjectOptions::default())
        .await
        .unwrap();
    assert!(info.etag.is_some());

    let mut expected = vec![1u8; 64];
    expected.extend_from_slice(&[2u8; 64]);
    assert_eq!(env.r0.object(REMOTE_A, "big").unwrap().data, expected);
    assert_eq!(env.r1.object(REMOTE_B, "big").unwrap().data, expected);

    let tag_a = env.r0.object(REMOTE_A, "big").unwrap().metadata.get("radio-tag").cloned();
    let tag_b = env.r1.object(REMOTE_B, "big").unwrap().metadata.get("radio-tag").cloned();
    assert!(tag_a.is_some());
    assert_eq!(tag_a, tag_b);

    // The logical id resolves to nothing once completed.
    let err = env
        .store
        .put_object_part(BUCKET, "big", &upload_id, 3, PutObjReader::from_vec(vec![3]), &ObjectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidUploadId(_, _, _)));
}

#[tokio::test]
async fn test_multipart_complete_with_one_replica_failing() {
    let env = setup().await;

    let upload_id = env
        .store
        .new_multipart_upload(BUCKET, "partial", &ObjectOptions::default())
        .await
        .unwrap();
    let part = env
        .store
        .put_object_part(
            BUCKET,
            "partial",
            &upload_id,
            1,
            PutObjReader::from_vec(vec![6; 32]),
            &ObjectOptions::default(),
        )
        .await
        .unwrap();

    env.r1.fail_completes(true);
    let info = env
        .store
        .complete_multipart_upload(
            BUCKET,
            "partial",
            &upload_id,
            vec![CompletePart {
                part_number: 1,
                etag: part.etag.clone().unwrap(),
            }],
            &ObjectOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(info.etag, env.r0.object(REMOTE_A, "partial").map(|o| o.etag));

    let entry = wait_for_journal(&env, REMOTE_B, "partial").await;
    assert_eq!(entry.op, JournalOp::PutObject);
    assert_eq!(entry.err_client_id, "replica-1-id");
    assert!(entry.radio_tag.is_some());
    assert_eq!(entry.etag, info.etag);

    let err = env
        .store
        .put_object_part(BUCKET, "partial", &upload_id, 2, PutObjReader::from_vec(vec![1]), &ObjectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidUploadId(_, _, _)));

    env.r1.fail_completes(false);
    assert_eq!(env.heal.replay(env.store.as_ref() as &dyn ClientLookup).await, 1);
    assert_eq!(env.r1.object(REMOTE_B, "partial").unwrap().data, vec![6; 32]);
}

#[tokio::test]
async fn test_multipart_abort_cleans_registry_and_backends() {
    let env = setup().await;

    let upload_id = env
        .store
        .new_multipart_upload(BUCKET, "aborted", &ObjectOptions::default())
        .await
        .unwrap();

    env.store.abort_multipart_upload(BUCKET, "aborted", &upload_id).await.unwrap();

    assert!(!env.r0.has_upload(&upload_id));
    assert!(!env.r1.has_upload(&upload_id));

    let err = env
        .store
        .abort_multipart_upload(BUCKET, "aborted", &upload_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidUploadId(_, _, _)));
}

#[tokio::test]
async fn test_unknown_upload_id_is_echoed() {
    let env = setup().await;

    let err = env
        .store
        .put_object_part(BUCKET, "obj", "no-such-upload", 1, PutObjReader::from_vec(vec![1]), &ObjectOptions::default())
        .await
        .unwrap_err();
    match err {
        StorageError::InvalidUploadId(bucket, object, upload_id) => {
            assert_eq!(bucket, BUCKET);
            assert_eq!(object, "obj");
            assert_eq!(upload_id, "no-such-upload");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_concurrent_writers_serialize_and_mirror() {
    let env = setup().await;

    let first = {
        let store = Arc::clone(&env.store);
        tokio::spawn(async move {
            store
                .put_object(BUCKET, "contended", PutObjReader::from_vec(vec![0xAA; 256]), &ObjectOptions::default())
                .await
        })
    };
    let second = {
        let store = Arc::clone(&env.store);
        tokio::spawn(async move {
            store
                .put_object(BUCKET, "contended", PutObjReader::from_vec(vec![0xBB; 256]), &ObjectOptions::default())
                .await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let a = env.r0.object(REMOTE_A, "contended").unwrap();
    let b = env.r1.object(REMOTE_B, "contended").unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(a.metadata.get("radio-tag"), b.metadata.get("radio-tag"));
    assert!(env.heal.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_objects_passes_through_first_replica() {
    let env = setup().await;

    for name in ["list/a", "list/b"] {
        env.store
            .put_object(BUCKET, name, PutObjReader::from_vec(vec![1]), &ObjectOptions::default())
            .await
            .unwrap();
    }

    let listed = env.store.list_objects(BUCKET, "list/", None, None, 100).await.unwrap();
    let keys: Vec<&str> = listed.objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(keys, vec!["list/a", "list/b"]);
    assert!(listed.objects.iter().all(|o| o.size == 1));
    assert!(!listed.is_truncated);
}
