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

//! The live routing snapshot: node set, locator, and operation factory,
//! always replaced together so they can never disagree about deployment shape.

use std::sync::Arc;

use crate::core::locator::ketama::KetamaLocator;
use crate::core::locator::vbucket::VBucketLocator;
use crate::core::locator::{EmptyLocator, Locator};
use crate::core::node::{CacheNode, NodeId, NodeProberFactory};
use crate::core::operation::{BasicOperationFactory, OperationFactory, VBucketOperationFactory};
use crate::core::types::{ConfigError, NodeDescriptor, PortType, VBucketServerMap};

/// `{currentNodes, locator, opFactory}`, built and replaced as one unit.
///
/// The locator and operation factory are chosen together: a vbucket map
/// always pairs [`VBucketLocator`] with [`VBucketOperationFactory`], and the
/// classic node list always pairs [`KetamaLocator`] with
/// [`BasicOperationFactory`]. There is no code path that can mix the two.
pub struct InternalState {
    /// Every node this snapshot knows about, alive or dead.
    pub nodes: Vec<Arc<CacheNode>>,
    /// The locator built over `nodes`.
    pub locator: Arc<dyn Locator>,
    /// The operation factory matched to `locator`'s deployment kind.
    pub op_factory: Arc<dyn OperationFactory>,
}

impl InternalState {
    /// The sentinel state before the first configuration has been applied:
    /// no nodes, a locator that routes nothing, a basic operation factory.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            locator: Arc::new(EmptyLocator),
            op_factory: Arc::new(BasicOperationFactory),
        }
    }

    /// Build a classic-deployment snapshot: unhealthy nodes are filtered out
    /// before the ring is built, so a node reported down never receives
    /// ring weight in the first place.
    pub fn build_basic(
        descriptors: &[NodeDescriptor],
        port_type: PortType,
        prober_factory: &dyn NodeProberFactory,
    ) -> Self {
        let mut nodes = Vec::new();
        let mut ids = Vec::new();
        let mut labels = Vec::new();

        for desc in descriptors.iter().filter(|d| d.is_healthy()) {
            let (host, port) = desc.endpoint(port_type);
            let endpoint = format!("{host}:{port}");
            let id = NodeId::new(endpoint.clone());
            let prober = prober_factory.prober_for(&id);
            nodes.push(Arc::new(CacheNode::new(id.clone(), prober)));
            ids.push(id);
            labels.push(endpoint);
        }

        let locator = Arc::new(KetamaLocator::new(ids, &labels));
        Self {
            nodes,
            locator,
            op_factory: Arc::new(BasicOperationFactory),
        }
    }

    /// Build a vbucket-deployment snapshot from a validated server map.
    pub fn build_vbucket(
        map: &VBucketServerMap,
        prober_factory: &dyn NodeProberFactory,
    ) -> Result<Self, ConfigError> {
        map.validate()?;

        let nodes = map
            .server_list
            .iter()
            .map(|endpoint| {
                let id = NodeId::new(endpoint.clone());
                let prober = prober_factory.prober_for(&id);
                Arc::new(CacheNode::new(id, prober))
            })
            .collect();

        let locator = Arc::new(VBucketLocator::new(map));
        Ok(Self {
            nodes,
            locator,
            op_factory: Arc::new(VBucketOperationFactory),
        })
    }

    /// Look up a node handle by identity.
    pub fn node_by_id(&self, id: &NodeId) -> Option<&Arc<CacheNode>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Whether `id` is both known to this snapshot and currently alive.
    pub fn is_alive(&self, id: &NodeId) -> bool {
        self.node_by_id(id).map(|n| n.is_alive()).unwrap_or(false)
    }

    /// All nodes in this snapshot currently believed dead.
    pub fn dead_nodes(&self) -> Vec<Arc<CacheNode>> {
        self.nodes.iter().filter(|n| !n.is_alive()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{NodeError, NodeProber};
    use async_trait::async_trait;

    struct AlwaysOkFactory;

    struct AlwaysOkProber;

    #[async_trait]
    impl NodeProber for AlwaysOkProber {
        async fn probe(&self, _id: &NodeId) -> Result<(), NodeError> {
            Ok(())
        }
    }

    impl NodeProberFactory for AlwaysOkFactory {
        fn prober_for(&self, _id: &NodeId) -> Box<dyn NodeProber> {
            Box::new(AlwaysOkProber)
        }
    }

    #[test]
    fn empty_state_routes_nothing() {
        let state = InternalState::empty();
        let always_alive = |_: &NodeId| true;
        assert!(state.locator.locate("k", &always_alive).is_err());
        assert!(state.nodes.is_empty());
    }

    #[test]
    fn build_basic_filters_unhealthy_descriptors() {
        let descriptors = vec![
            NodeDescriptor {
                host: "a".into(),
                proxy_port: 11211,
                direct_port: 11210,
                status: "healthy".into(),
            },
            NodeDescriptor {
                host: "b".into(),
                proxy_port: 11211,
                direct_port: 11210,
                status: "warmup".into(),
            },
        ];
        let state = InternalState::build_basic(&descriptors, PortType::Direct, &AlwaysOkFactory);
        assert_eq!(state.nodes.len(), 1);
        assert_eq!(state.nodes[0].id().as_str(), "a:11210");
    }
}
