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
use std::time::Duration;
use tracing::debug;

use crate::error::{LockError, Result};
use crate::lock_args::LockArgs;
use crate::rpc::{
    LOCK_RPC_PREFIX, LockRpcResponse, METHOD_FORCE_UNLOCK, METHOD_LOCK, METHOD_REFRESH, METHOD_RLOCK, METHOD_RUNLOCK,
    METHOD_UNLOCK,
};
use crate::Locker;

const LOCK_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Lock RPC client for one peer. Requests carry the cluster bearer token
/// and a JSON-encoded [`LockArgs`] body.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    addr: String,
    token: String,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(url: url::Url, token: &str) -> Self {
        let addr = url.as_str().trim_end_matches('/').to_string();
        Self {
            addr,
            token: token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, method: &str, args: &LockArgs) -> Result<bool> {
        debug!("remote lock rpc {} for {}", method, args);
        let url = format!("{}{}/{}", self.addr, LOCK_RPC_PREFIX, method);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .timeout(LOCK_RPC_TIMEOUT)
            .json(args)
            .send()
            .await
            .map_err(|err| LockError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LockError::Rejected(format!("peer returned status {}", response.status())));
        }

        let body: LockRpcResponse = response.json().await.map_err(|err| LockError::Transport(err.to_string()))?;
        if let Some(error_info) = body.error_info {
            return Err(LockError::Rejected(error_info));
        }

        Ok(body.success)
    }
}

#[async_trait]
impl Locker for RemoteClient {
    async fn lock(&mut self, args: &LockArgs) -> Result<bool> {
        self.call(METHOD_LOCK, args).await
    }

    async fn unlock(&mut self, args: &LockArgs) -> Result<bool> {
        self.call(METHOD_UNLOCK, args).await
    }

    async fn rlock(&mut self, args: &LockArgs) -> Result<bool> {
        self.call(METHOD_RLOCK, args).await
    }

    async fn runlock(&mut self, args: &LockArgs) -> Result<bool> {
        self.call(METHOD_RUNLOCK, args).await
    }

    async fn refresh(&mut self, args: &LockArgs) -> Result<bool> {
        self.call(METHOD_REFRESH, args).await
    }

    async fn force_unlock(&mut self, args: &LockArgs) -> Result<bool> {
        self.call(METHOD_FORCE_UNLOCK, args).await
    }

    async fn is_online(&self) -> bool {
        true
    }

    async fn is_local(&self) -> bool {
        false
    }
}
