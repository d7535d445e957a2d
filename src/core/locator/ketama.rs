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

//! Ketama consistent-hashing ring for classic (non-vbucket) deployments.
//!
//! Each node contributes 40 replica points, each replica's MD5 digest split
//! into 4 little-endian 32-bit words, for 160 ring points per node. A key's
//! point is its own MD5-derived hash; the node is whichever point comes next
//! going clockwise, wrapping around to the first point at the end of the ring.

use md5::{Digest, Md5};

use super::{Locator, LocatorError};
use crate::core::node::NodeId;

const POINTS_PER_REPLICA: u32 = 40;

#[derive(Clone, Debug)]
struct RingPoint {
    point: u32,
    node_index: usize,
}

/// A Ketama ring built once over a fixed, ordered node list.
#[derive(Debug)]
pub struct KetamaLocator {
    nodes: Vec<NodeId>,
    ring: Vec<RingPoint>,
}

impl KetamaLocator {
    /// Build the ring from `nodes`, keyed by each node's `label` (typically
    /// its `host:port` endpoint). `nodes` and `labels` must be the same length
    /// and in correspondence index-for-index.
    pub fn new(nodes: Vec<NodeId>, labels: &[String]) -> Self {
        debug_assert_eq!(nodes.len(), labels.len());
        let mut ring = Vec::with_capacity(nodes.len() * POINTS_PER_REPLICA as usize * 4);
        for (node_index, label) in labels.iter().enumerate() {
            for replica in 0..POINTS_PER_REPLICA {
                let digest = Md5::digest(format!("{label}-{replica}").as_bytes());
                for chunk in digest.chunks_exact(4) {
                    let point = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    ring.push(RingPoint { point, node_index });
                }
            }
        }
        // Stable sort: ties keep the insertion order (node order, then replica,
        // then digest-word order) produced above.
        ring.sort_by_key(|p| p.point);
        Self { nodes, ring }
    }

    fn hash_key(key: &str) -> u32 {
        let digest = Md5::digest(key.as_bytes());
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

impl Locator for KetamaLocator {
    fn locate(&self, key: &str, is_alive: &dyn Fn(&NodeId) -> bool) -> Result<NodeId, LocatorError> {
        if self.ring.is_empty() {
            return Err(LocatorError::NoRoute(key.to_owned()));
        }
        let hash = Self::hash_key(key);
        let start = self
            .ring
            .partition_point(|p| p.point < hash);

        let len = self.ring.len();
        for offset in 0..len {
            let idx = (start + offset) % len;
            let node = &self.nodes[self.ring[idx].node_index];
            if is_alive(node) {
                return Ok(node.clone());
            }
        }
        Err(LocatorError::NoRoute(key.to_owned()))
    }

    fn working_nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_locator() -> KetamaLocator {
        let nodes = vec![
            NodeId::new("a:11211"),
            NodeId::new("b:11211"),
            NodeId::new("c:11211"),
        ];
        let labels: Vec<String> = nodes.iter().map(|n| n.as_str().to_owned()).collect();
        KetamaLocator::new(nodes, &labels)
    }

    #[test]
    fn ring_has_160_points_per_node() {
        let locator = sample_locator();
        assert_eq!(locator.ring.len(), 160 * 3);
    }

    #[test]
    fn same_key_always_maps_to_same_node_when_all_alive() {
        let locator = sample_locator();
        let always_alive = |_: &NodeId| true;
        let first = locator.locate("widget-42", &always_alive).unwrap();
        for _ in 0..50 {
            assert_eq!(locator.locate("widget-42", &always_alive).unwrap(), first);
        }
    }

    #[test]
    fn dead_node_is_skipped_in_favor_of_next_ring_point() {
        let locator = sample_locator();
        let always_alive = |_: &NodeId| true;
        let primary = locator.locate("widget-42", &always_alive).unwrap();

        let skip_primary = |n: &NodeId| n != &primary;
        let fallback = locator.locate("widget-42", &skip_primary).unwrap();
        assert_ne!(fallback, primary);
    }

    #[test]
    fn all_dead_yields_no_route() {
        let locator = sample_locator();
        let none_alive = |_: &NodeId| false;
        assert_eq!(
            locator.locate("widget-42", &none_alive).unwrap_err(),
            LocatorError::NoRoute("widget-42".to_owned())
        );
    }

    #[test]
    fn empty_node_list_yields_no_route() {
        let locator = KetamaLocator::new(Vec::new(), &[]);
        let always_alive = |_: &NodeId| true;
        assert!(locator.locate("anything", &always_alive).is_err());
    }
}
