// Copyright (c) 2026 Cachering
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Cluster configuration data model (`ClusterConfig` and its nested types).
//!
//! These are `serde`-deserializable from the JSON documents a pool controller
//! (couchbase/membase-style) emits, so the out-of-scope HTTP config listener
//! can hand a parsed value straight to the pool manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-level errors: malformed or empty input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Pool URL set, node list, or vbucket map failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Which port a classic (non-vbucket) client should connect through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// Connect through the memcached proxy port (moxi-style).
    Proxy,
    /// Connect directly to the node's cache port.
    Direct,
}

/// One node as reported by the classic (non-vbucket) pool config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Hostname or IP address.
    pub host: String,
    /// Proxy port (moxi).
    pub proxy_port: u16,
    /// Direct cache port.
    pub direct_port: u16,
    /// Reported health status, e.g. "healthy".
    pub status: String,
}

impl NodeDescriptor {
    /// Whether this node is eligible for routing per its reported status.
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }

    /// Resolve the `(host, port)` pair this node should be reached at.
    pub fn endpoint(&self, port_type: PortType) -> (String, u16) {
        let port = match port_type {
            PortType::Proxy => self.proxy_port,
            PortType::Direct => self.direct_port,
        };
        (self.host.clone(), port)
    }
}

/// Hash algorithm named by a vbucket server map.
///
/// Closed set: any name outside this enumeration fails to deserialize, which
/// is the behavior we want — an unknown algorithm name is a malformed config,
/// not something to silently default past.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithmKind {
    /// CRC-32, truncated to the bucket count width. The minimum required algorithm.
    Crc,
    /// Ketama-style MD5 ring hash, used by some vbucket deployments.
    Ketama,
}

/// Server-supplied vbucket map: ordered server list plus per-bucket master/replica indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VBucketServerMap {
    /// Hash algorithm used to map a key to a bucket index.
    pub hash_algorithm: HashAlgorithmKind,
    /// Ordered `"host:port"` strings; indices into this list are used by `v_bucket_map`.
    pub server_list: Vec<String>,
    /// One entry per vbucket. Each inner vector's first element is the master
    /// index into `server_list`; the remainder are replica indices.
    pub v_bucket_map: Vec<Vec<i32>>,
}

impl VBucketServerMap {
    /// Validate `vBucketMap[i].master < len(serverList)` for all entries, and
    /// that every row has at least one entry and the bucket count is a power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_list.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "vbucket server map has an empty server list".into(),
            ));
        }
        if self.v_bucket_map.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "vbucket map has no buckets".into(),
            ));
        }
        if !self.v_bucket_map.len().is_power_of_two() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "vbucket count {} is not a power of two",
                self.v_bucket_map.len()
            )));
        }
        for (i, row) in self.v_bucket_map.iter().enumerate() {
            let Some(&master) = row.first() else {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "vbucket {i} has no master entry"
                )));
            };
            if master < 0 || master as usize >= self.server_list.len() {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "vbucket {i} master index {master} out of range (server_list has {} entries)",
                    self.server_list.len()
                )));
            }
        }
        Ok(())
    }
}

/// A single immutable vbucket: master node index plus ordered replica indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VBucket {
    /// Index into the locator's node list.
    pub master: usize,
    /// Ordered replica indices, in failover preference order.
    pub replicas: Vec<usize>,
}

/// A cluster configuration snapshot, as delivered by the (external) config adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterConfig {
    /// A vbucket-partitioned deployment.
    VBucket {
        /// The server-supplied vbucket map.
        #[serde(rename = "vBucketServerMap")]
        v_bucket_server_map: VBucketServerMap,
    },
    /// A classic (Ketama ring) deployment.
    Basic {
        /// Node descriptors, pre-filtering on health status.
        nodes: Vec<NodeDescriptor>,
        /// Which port clients should use.
        #[serde(rename = "portType")]
        port_type: PortType,
    },
}

impl ClusterConfig {
    /// Whether this snapshot selects the vbucket construction path.
    pub fn is_vbucket(&self) -> bool {
        matches!(self, ClusterConfig::VBucket { .. })
    }
}

/// Identity the pool manager authenticates as: bucket name plus SASL credentials.
///
/// If the effective bucket name is empty or `"default"`, no SASL provider is
/// attached at all (default/unauthenticated bucket). Otherwise a plain-text
/// SASL authenticator is built from `(bucket_name, bucket_password)`, where
/// `bucket_password` defaults, in order, to the explicit parameter, the
/// configured password, then the bucket name itself.
#[derive(Clone, Debug, Default)]
pub struct BucketIdentity {
    /// Bucket name. Empty or `"default"` selects the unauthenticated bucket.
    pub bucket_name: String,
    /// Explicit password parameter, if the caller supplied one directly.
    pub explicit_password: Option<String>,
    /// Password configured alongside the bucket name, if any.
    pub configured_password: Option<String>,
}

/// Resolved SASL selection: either no authentication, or plain-text credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaslSelection {
    /// Default, unauthenticated bucket.
    None,
    /// Plain-text SASL with the given bucket name and resolved password.
    PlainText {
        /// Bucket/user name.
        bucket_name: String,
        /// Resolved password.
        password: String,
    },
}

impl BucketIdentity {
    /// Resolve which SASL provider (if any) the pool manager should attach.
    pub fn resolve_sasl(&self) -> SaslSelection {
        if self.bucket_name.is_empty() || self.bucket_name.eq_ignore_ascii_case("default") {
            return SaslSelection::None;
        }
        let password = self
            .explicit_password
            .clone()
            .or_else(|| self.configured_password.clone())
            .unwrap_or_else(|| self.bucket_name.clone());
        SaslSelection::PlainText {
            bucket_name: self.bucket_name.clone(),
            password,
        }
    }
}

/// Non-empty set of configuration endpoint base URIs.
///
/// A startup check rejects an empty set; this is the one piece of the
/// external config-adapter surface the core validates directly, since an
/// empty pool URL set can never yield a usable config stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolUrls(Vec<String>);

impl PoolUrls {
    /// Construct from a sequence of pool URLs, rejecting an empty set.
    pub fn new(urls: Vec<String>) -> Result<Self, ConfigError> {
        if urls.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "At least 1 pool url must be specified.".into(),
            ));
        }
        Ok(Self(urls))
    }

    /// The underlying URLs.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
