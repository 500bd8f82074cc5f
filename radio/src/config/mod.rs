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

//! YAML configuration of the gateway: TLS material paths, the lock peer
//! cluster, the mirrored bucket bindings and the journal directory.

use radio_remote::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use url::Url;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Replica protection scheme. Only mirroring is supported; any other value
/// fails configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectionType {
    #[serde(rename = "mirror")]
    Mirror,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertsConfig {
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub key_file: String,
    #[serde(default)]
    pub ca_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributeConfig {
    /// Comma-separated peer URLs of the lock cluster.
    #[serde(default)]
    pub peers: String,
    /// Shared bearer token for the inter-peer lock RPCs.
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    pub scheme: ProtectionType,
    #[serde(default)]
    pub parity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Advisory only; the gateway chains credentials per remote.
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    pub protection: ProtectionConfig,
    pub remote: Vec<RemoteConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadioConfig {
    #[serde(default)]
    pub certs: CertsConfig,
    #[serde(default)]
    pub distribute: DistributeConfig,
    #[serde(default)]
    pub buckets: HashMap<String, BucketConfig>,
    #[serde(default)]
    pub journal: JournalConfig,
}

/// One lock peer; `is_local` marks this process's own endpoint, served
/// in-process instead of over the RPC.
#[derive(Debug, Clone)]
pub struct PeerEndpoint {
    pub url: Url,
    pub is_local: bool,
}

impl RadioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(ConfigError::Invalid("no buckets configured".to_string()));
        }
        if self.journal.dir.is_empty() {
            return Err(ConfigError::Invalid("journal.dir is required".to_string()));
        }
        for (name, bucket) in &self.buckets {
            if bucket.remote.len() != 2 {
                return Err(ConfigError::Invalid(format!(
                    "invalid remote configuration specified for {name}, expecting 2 remotes"
                )));
            }
            for remote in &bucket.remote {
                if remote.bucket.is_empty() || remote.endpoint.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "remote of bucket {name} is missing bucket or endpoint"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The lock peer set, with this process's endpoint marked local. An
    /// empty `distribute.peers` yields an empty set and in-process locking.
    pub fn peer_endpoints(&self, local_addr: &SocketAddr) -> Result<Vec<PeerEndpoint>> {
        let mut endpoints = Vec::new();
        for peer in self.distribute.peers.split(',') {
            let peer = peer.trim();
            if peer.is_empty() {
                continue;
            }
            let url = Url::parse(peer).map_err(|err| ConfigError::Invalid(format!("invalid peer url {peer}: {err}")))?;
            let is_local = url.port_or_known_default() == Some(local_addr.port())
                && url
                    .host_str()
                    .map(|host| {
                        host == "localhost"
                            || host == "127.0.0.1"
                            || host == "::1"
                            || host == local_addr.ip().to_string()
                    })
                    .unwrap_or(false);
            endpoints.push(PeerEndpoint { url, is_local });
        }
        Ok(endpoints)
    }
}

/// Loads the configuration from a file path, or from stdin when the path
/// is `-`.
pub fn load(path: &str) -> Result<RadioConfig> {
    let data = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };

    let config: RadioConfig = serde_yaml::from_str(&data)?;
    config.validate()?;
    Ok(config)
}
