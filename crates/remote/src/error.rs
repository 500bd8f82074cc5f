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

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote bucket not found: {0}")]
    BucketNotFound(String),

    #[error("remote object not found: {0}")]
    ObjectNotFound(String),

    #[error("remote upload not found: {0}")]
    UploadNotFound(String),

    #[error("remote pre-condition failed")]
    PreconditionFailed,

    #[error("remote api error {code}: {message}")]
    Api { code: String, message: String },

    #[error("invalid remote configuration: {0}")]
    Config(String),

    #[error("remote io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Service error code, when the remote produced one.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Api { code, .. } => Some(code.as_str()),
            RemoteError::BucketNotFound(_) => Some("NoSuchBucket"),
            RemoteError::ObjectNotFound(_) => Some("NoSuchKey"),
            RemoteError::UploadNotFound(_) => Some("NoSuchUpload"),
            RemoteError::PreconditionFailed => Some("PreconditionFailed"),
            _ => None,
        }
    }

    pub fn other<E>(error: E) -> Self
    where
        E: std::fmt::Display,
    {
        RemoteError::Other(error.to_string())
    }
}
