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

use radio_remote::RemoteError;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Object not found: {0}/{1}")]
    ObjectNotFound(String, String),

    #[error("Invalid upload id: {0}/{1}-{2}")]
    InvalidUploadId(String, String, String),

    #[error("Pre-condition failed")]
    PreconditionFailed,

    #[error("Remote backends are offline")]
    BackendDown,

    #[error("Operation timed out")]
    OperationTimedOut,

    #[error("The requested range is not satisfiable")]
    InvalidRange,

    #[error("Invalid arguments provided for {0}/{1}: {2}")]
    InvalidArgument(String, String, String),

    #[error("unexpected")]
    Unexpected,

    #[error("lock: {0}")]
    Lock(String),

    #[error("remote: {0}")]
    Remote(String),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contextualizes a replica error into the gateway taxonomy, the way the
/// front-end expects to surface it.
pub fn to_object_err(err: &RemoteError, bucket: &str, object: &str) -> StorageError {
    match err {
        RemoteError::BucketNotFound(_) => StorageError::BucketNotFound(bucket.to_string()),
        RemoteError::ObjectNotFound(_) => StorageError::ObjectNotFound(bucket.to_string(), object.to_string()),
        RemoteError::UploadNotFound(id) => {
            StorageError::InvalidUploadId(bucket.to_string(), object.to_string(), id.clone())
        }
        RemoteError::PreconditionFailed => StorageError::PreconditionFailed,
        other => StorageError::Remote(other.to_string()),
    }
}
