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

//! Node locators: map a cache key to the node(s) that own it.
//!
//! Two deployment shapes, two locators: [`ketama`] builds a consistent-hashing
//! ring over the classic node list; [`vbucket`] resolves a server-supplied
//! vbucket map. Both are built once, at construction, from a frozen node list
//! handed to them by the pool manager's state swap — neither locator mutates
//! itself afterward; a membership change always means building a new one.

pub mod ketama;
pub mod vbucket;

use thiserror::Error;

use crate::core::node::NodeId;

/// Locator-level errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// No live node could be found for a key (all candidates are dead, or the
    /// ring/map is empty).
    #[error("no route for key {0:?}")]
    NoRoute(String),
}

/// Maps cache keys to the node(s) responsible for them.
///
/// Implementations are built once from a fixed node list (`initialize`) and
/// answer `locate` queries against that frozen snapshot; a locator never
/// reacts to a node's live/dead transitions on its own; the caller re-checks
/// liveness (and, for vbucket, calls back in for replicas) at lookup time.
pub trait Locator: Send + Sync {
    /// Resolve `key` to a node, skipping candidates `is_alive` rejects.
    ///
    /// Liveness is supplied by the caller rather than tracked by the locator:
    /// the locator is an immutable snapshot of the ring/map shape, while
    /// liveness changes continuously as the resurrection timer runs.
    fn locate(&self, key: &str, is_alive: &dyn Fn(&NodeId) -> bool) -> Result<NodeId, LocatorError>;

    /// Resolve a vbucket index a caller already holds (e.g. one stamped on a
    /// prior operation by the vbucket operation factory) straight to its
    /// master node, bypassing the key hash. Only [`vbucket::VBucketLocator`]
    /// gives this a real implementation; every other locator kind has no
    /// notion of a vbucket index and reports [`LocatorError::NoRoute`].
    fn locate_by_vbucket(
        &self,
        index: usize,
        _is_alive: &dyn Fn(&NodeId) -> bool,
    ) -> Result<NodeId, LocatorError> {
        Err(LocatorError::NoRoute(format!(
            "vbucket index {index} (this locator has no vbucket map)"
        )))
    }

    /// All nodes this locator was built over, in the order it considers canonical.
    fn working_nodes(&self) -> &[NodeId];
}

/// The locator half of [`crate::core::pool::state::InternalState::empty`]:
/// routes nothing, since there is nothing to route to yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyLocator;

impl Locator for EmptyLocator {
    fn locate(&self, key: &str, _is_alive: &dyn Fn(&NodeId) -> bool) -> Result<NodeId, LocatorError> {
        Err(LocatorError::NoRoute(key.to_owned()))
    }

    fn working_nodes(&self) -> &[NodeId] {
        &[]
    }
}
