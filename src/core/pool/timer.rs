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

//! The resurrection timer: periodically re-probes dead nodes until none remain.
//!
//! It is not a recurring `tokio::time::interval`. It is a one-shot sleep that
//! rearms itself after every probe pass that still finds a dead node, and
//! goes fully at rest (no task, no wakeups) the moment a pass finds zero.
//! Arming is guarded by a lock (`armed`); the probe pass itself runs while
//! that same lock is held, so a node failing mid-pass blocks its
//! `arm_if_needed` caller until the pass has recorded its outcome, instead of
//! racing a stale decision to go to rest.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

type ProbePass = Pin<Box<dyn Future<Output = usize> + Send>>;

/// Self-rearming dead-node re-probe timer.
pub struct ResurrectionTimer {
    dead_timeout: Duration,
    armed: Mutex<bool>,
}

impl ResurrectionTimer {
    /// Build a timer that waits `dead_timeout` between probe passes.
    pub fn new(dead_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            dead_timeout,
            armed: Mutex::new(false),
        })
    }

    /// Ensure a probe pass is scheduled. A no-op if one is already running.
    ///
    /// `probe_pass` is called once per tick (after the `dead_timeout` sleep)
    /// and must return the number of nodes still dead afterward; the timer
    /// rearms itself only while that count stays above zero.
    pub async fn arm_if_needed<F>(self: &Arc<Self>, probe_pass: F)
    where
        F: Fn() -> ProbePass + Send + Sync + 'static,
    {
        let mut armed = self.armed.lock().await;
        if *armed {
            return;
        }
        *armed = true;
        drop(armed);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(probe_pass).await;
        });
    }

    async fn run<F>(self: Arc<Self>, probe_pass: F)
    where
        F: Fn() -> ProbePass + Send + Sync + 'static,
    {
        loop {
            tokio::time::sleep(self.dead_timeout).await;

            // The probe pass runs while `armed` is held, not just the
            // decision afterward: a node that fails mid-pass calls
            // `arm_if_needed`, which blocks on this same lock until the pass
            // below finishes and either rearms (stays `true`, so that caller
            // no-ops, correctly deferring to the loop it's about to restart)
            // or goes to rest (the caller then arms a fresh pass itself).
            // Without holding the lock across the `.await`, a failure
            // landing between the pass returning 0 and the decision being
            // recorded would be silently stranded dead with no probe loop
            // watching it.
            let mut armed = self.armed.lock().await;
            let remaining = probe_pass().await;
            debug!(remaining, "resurrection probe pass complete");
            if remaining == 0 {
                *armed = false;
                return;
            }
        }
    }

    /// Whether a probe loop is currently scheduled/running.
    pub async fn is_armed(&self) -> bool {
        *self.armed.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn rearms_while_dead_nodes_remain_then_goes_to_rest() {
        let timer = ResurrectionTimer::new(Duration::from_millis(100));
        let remaining_dead = Arc::new(AtomicUsize::new(2));
        let passes = Arc::new(AtomicUsize::new(0));

        let remaining_for_closure = remaining_dead.clone();
        let passes_for_closure = passes.clone();
        timer
            .arm_if_needed(move || {
                let remaining_dead = remaining_for_closure.clone();
                let passes = passes_for_closure.clone();
                Box::pin(async move {
                    passes.fetch_add(1, Ordering::SeqCst);
                    let current = remaining_dead.load(Ordering::SeqCst);
                    if current > 0 {
                        remaining_dead.store(current - 1, Ordering::SeqCst);
                    }
                    remaining_dead.load(Ordering::SeqCst)
                })
            })
            .await;

        assert!(timer.is_armed().await);

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert_eq!(passes.load(Ordering::SeqCst), 2);
        assert!(!timer.is_armed().await);
    }

    #[tokio::test]
    async fn second_arm_while_running_is_a_no_op() {
        let timer = ResurrectionTimer::new(Duration::from_secs(3600));
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        timer
            .arm_if_needed(move || {
                let calls = calls_clone.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    0
                })
            })
            .await;
        timer
            .arm_if_needed(move || Box::pin(async move { 0 }))
            .await;

        assert!(timer.is_armed().await);
    }
}
