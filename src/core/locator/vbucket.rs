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

//! vbucket-map locator for partitioned deployments.
//!
//! Unlike the Ketama ring, the bucket-to-node assignment here is not computed
//! locally: it is handed down verbatim by the server-supplied
//! [`VBucketServerMap`](crate::core::types::VBucketServerMap). This locator's
//! only job is `hash(key) mod bucket_count` plus looking the resulting bucket
//! up in the frozen table; it never substitutes a replica on its own; a dead
//! master is the caller's problem (the operation layer decides whether to
//! retry against a replica).

use crc32fast::Hasher;

use super::{Locator, LocatorError};
use crate::core::node::NodeId;
use crate::core::types::VBucketServerMap;
use crate::core::types::VBucket as VBucketRow;

/// A frozen vbucket table built from a server-supplied map.
#[derive(Debug)]
pub struct VBucketLocator {
    nodes: Vec<NodeId>,
    buckets: Vec<VBucketRow>,
}

impl VBucketLocator {
    /// Build the locator from a validated server map.
    ///
    /// Caller is expected to have already run
    /// [`VBucketServerMap::validate`](crate::core::types::VBucketServerMap::validate);
    /// this constructor trusts the map's shape.
    pub fn new(map: &VBucketServerMap) -> Self {
        let nodes = map
            .server_list
            .iter()
            .map(|endpoint| NodeId::new(endpoint.clone()))
            .collect();
        let buckets = map
            .v_bucket_map
            .iter()
            .map(|row| VBucketRow {
                master: row[0] as usize,
                replicas: row[1..]
                    .iter()
                    .filter(|&&idx| idx >= 0)
                    .map(|&idx| idx as usize)
                    .collect(),
            })
            .collect();
        Self { nodes, buckets }
    }

    /// The bucket index `key` hashes to: `crc32(key) mod len(buckets)`.
    /// Bucket count is a power of two, so the modulo reduces to a mask.
    pub fn bucket_index(&self, key: &str) -> usize {
        let mut hasher = Hasher::new();
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        (hash as usize) & (self.buckets.len() - 1)
    }

    /// Resolve `key` to its vbucket row (master plus replicas), without
    /// consulting liveness.
    pub fn locate_bucket(&self, key: &str) -> Result<&VBucketRow, LocatorError> {
        if self.buckets.is_empty() {
            return Err(LocatorError::NoRoute(key.to_owned()));
        }
        Ok(&self.buckets[self.bucket_index(key)])
    }

    /// Resolve a vbucket index a caller already holds (e.g. one stamped on a
    /// prior [`Operation`](crate::core::operation::Operation) by the vbucket
    /// operation factory) straight to its master node, bypassing the key hash.
    pub fn locate_by_vbucket(
        &self,
        index: usize,
        is_alive: &dyn Fn(&NodeId) -> bool,
    ) -> Result<NodeId, LocatorError> {
        let row = self
            .buckets
            .get(index)
            .ok_or_else(|| LocatorError::NoRoute(format!("vbucket index {index}")))?;
        let master = self
            .nodes
            .get(row.master)
            .ok_or_else(|| LocatorError::NoRoute(format!("vbucket index {index}")))?;
        if is_alive(master) {
            Ok(master.clone())
        } else {
            Err(LocatorError::NoRoute(format!("vbucket index {index}")))
        }
    }
}

impl Locator for VBucketLocator {
    fn locate(&self, key: &str, is_alive: &dyn Fn(&NodeId) -> bool) -> Result<NodeId, LocatorError> {
        let row = self.locate_bucket(key)?;
        let master = self
            .nodes
            .get(row.master)
            .ok_or_else(|| LocatorError::NoRoute(key.to_owned()))?;
        // No automatic replica substitution: a dead master is surfaced as-is
        // so the operation layer can make an explicit retry decision.
        if is_alive(master) {
            Ok(master.clone())
        } else {
            Err(LocatorError::NoRoute(key.to_owned()))
        }
    }

    fn locate_by_vbucket(
        &self,
        index: usize,
        is_alive: &dyn Fn(&NodeId) -> bool,
    ) -> Result<NodeId, LocatorError> {
        VBucketLocator::locate_by_vbucket(self, index, is_alive)
    }

    fn working_nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}
