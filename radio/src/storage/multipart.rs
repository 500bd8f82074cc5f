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

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Registry mapping a gateway-minted logical upload id to the ordered
/// backend upload ids, one per replica index. An entry either carries one
/// id per replica or is absent; partial entries are never stored.
///
/// The registry is process-local: the front-end must route all requests
/// for a logical upload id to the node that minted it. Mutations happen
/// while the upload-id namespace lock is held.
#[derive(Debug, Default)]
pub struct MultipartUploadMap {
    inner: RwLock<HashMap<String, Vec<String>>>,
}

impl MultipartUploadMap {
    pub async fn insert(&self, upload_id: &str, backend_ids: Vec<String>) {
        self.inner.write().await.insert(upload_id.to_string(), backend_ids);
    }

    pub async fn get(&self, upload_id: &str) -> Option<Vec<String>> {
        self.inner.read().await.get(upload_id).cloned()
    }

    pub async fn remove(&self, upload_id: &str) {
        self.inner.write().await.remove(upload_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle() {
        let map = MultipartUploadMap::default();
        assert!(map.get("u1").await.is_none());

        map.insert("u1", vec!["b0".to_string(), "b1".to_string()]).await;
        let ids = map.get("u1").await.unwrap();
        assert_eq!(ids, vec!["b0".to_string(), "b1".to_string()]);

        map.remove("u1").await;
        assert!(map.get("u1").await.is_none());
    }
}
