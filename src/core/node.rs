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

//! A single cache node's liveness lifecycle.
//!
//! The actual socket and memcached-protocol work live outside this crate;
//! [`NodeProber`] is the seam a connection-pool collaborator plugs into so
//! [`CacheNode`] can track liveness and notify the pool manager's resurrection
//! timer without knowing anything about wire formats.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Identifies one cache node by its routable endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Build an identity from a `host:port` (or equivalent) endpoint string.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    /// The endpoint string this id was built from.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced while probing or otherwise operating on a node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node did not respond within the prober's own timeout/retry policy.
    #[error("node {0} unreachable")]
    NodeUnreachable(NodeId),
    /// The node was disposed and can no longer be operated on.
    #[error("node {0} has been disposed")]
    Disposed(NodeId),
}

/// External collaborator that knows how to check whether a node is alive.
///
/// Implemented outside this crate (it requires socket I/O); this trait is the
/// seam the pool manager's resurrection timer calls through.
#[async_trait]
pub trait NodeProber: Send + Sync {
    /// Attempt to reach `id`. `Ok` means the node answered; `Err` means it
    /// should remain (or become) marked dead.
    async fn probe(&self, id: &NodeId) -> Result<(), NodeError>;
}

/// External collaborator that mints a [`NodeProber`] for a freshly-discovered
/// endpoint. Lets the pool manager build [`CacheNode`]s without knowing how
/// connections are actually established.
pub trait NodeProberFactory: Send + Sync {
    /// Build the prober a new node handle for `id` should use.
    fn prober_for(&self, id: &NodeId) -> Box<dyn NodeProber>;
}

type FailedListener = Box<dyn Fn(&NodeId) + Send + Sync>;

/// One cache node's liveness state, decoupled from the transport that proves it.
///
/// `failed` listeners are explicit registrations (no ambient event bus): the
/// pool manager registers exactly one, to learn when a node it is actively
/// routing to goes dead, and that registration is cleared on [`Self::dispose`].
pub struct CacheNode {
    id: NodeId,
    alive: AtomicBool,
    last_failure: Mutex<Option<Instant>>,
    failed_listeners: Mutex<Vec<FailedListener>>,
    prober: Box<dyn NodeProber>,
    disposed: AtomicBool,
}

impl fmt::Debug for CacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheNode")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish()
    }
}

impl CacheNode {
    /// Construct a node handle, initially alive, for `id`.
    pub fn new(id: NodeId, prober: Box<dyn NodeProber>) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            last_failure: Mutex::new(None),
            failed_listeners: Mutex::new(Vec::new()),
            prober,
            disposed: AtomicBool::new(false),
        }
    }

    /// This node's identity.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Whether this node is currently believed reachable.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Timestamp of the most recent observed failure, if any.
    pub fn last_failure(&self) -> Option<Instant> {
        *self.last_failure.lock().expect("last_failure lock poisoned")
    }

    /// Whether [`Self::dispose`] has been called on this handle.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Register a callback invoked when this node transitions alive -> dead.
    /// Registrations are additive; there is no unregister beyond [`Self::dispose`].
    pub fn on_failed(&self, listener: impl Fn(&NodeId) + Send + Sync + 'static) {
        self.failed_listeners
            .lock()
            .expect("failed_listeners lock poisoned")
            .push(Box::new(listener));
    }

    /// Probe the node, updating liveness and notifying `failed` listeners on
    /// a fresh alive-to-dead transition.
    pub async fn ping(&self) -> Result<(), NodeError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(NodeError::Disposed(self.id.clone()));
        }
        match self.prober.probe(&self.id).await {
            Ok(()) => {
                let was_dead = !self.alive.swap(true, Ordering::AcqRel);
                if was_dead {
                    debug!(node = %self.id, "resurrection probe succeeded");
                    *self.last_failure.lock().expect("last_failure lock poisoned") = None;
                }
                Ok(())
            }
            Err(err) => {
                self.mark_failed();
                Err(err)
            }
        }
    }

    /// Mark this node dead and notify listeners, if this is a fresh transition.
    pub fn mark_failed(&self) {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        *self.last_failure.lock().expect("last_failure lock poisoned") = Some(Instant::now());
        if was_alive {
            warn!(node = %self.id, "node marked dead");
            let listeners = self.failed_listeners.lock().expect("failed_listeners lock poisoned");
            for listener in listeners.iter() {
                listener(&self.id);
            }
        }
    }

    /// Release this handle: clears `failed` registrations so no further
    /// notifications fire, and marks the node permanently unusable.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.alive.store(false, Ordering::Release);
        self.failed_listeners
            .lock()
            .expect("failed_listeners lock poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct AlwaysFail;

    #[async_trait]
    impl NodeProber for AlwaysFail {
        async fn probe(&self, id: &NodeId) -> Result<(), NodeError> {
            Err(NodeError::NodeUnreachable(id.clone()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl NodeProber for AlwaysOk {
        async fn probe(&self, _id: &NodeId) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_listener_fires_once_on_transition() {
        let node = CacheNode::new(NodeId::new("a:11211"), Box::new(AlwaysFail));
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        node.on_failed(move |_| fired_clone.store(true, Ordering::SeqCst));

        assert!(node.ping().await.is_err());
        assert!(!node.is_alive());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dispose_clears_listeners() {
        let node = CacheNode::new(NodeId::new("a:11211"), Box::new(AlwaysFail));
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        node.on_failed(move |_| fired_clone.store(true, Ordering::SeqCst));
        node.dispose();

        assert!(node.ping().await.is_err());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn successful_probe_clears_last_failure() {
        let node = CacheNode::new(NodeId::new("a:11211"), Box::new(AlwaysOk));
        node.mark_failed();
        assert!(node.last_failure().is_some());

        node.ping().await.unwrap();
        assert!(node.is_alive());
        assert!(node.last_failure().is_none());
    }
}
