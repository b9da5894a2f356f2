// Copyright 2025 eraflo
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

//! Ties barriers to monotonic fence values reported by an external device.
//!
//! A graphics device exposes a fence whose completed value grows as GPU work
//! retires. The main thread polls a [`FenceWatcher`] once per frame; every
//! barrier waiting on a value the fence has reached is decremented.

use crate::barrier::TaskBarrier;
use crate::error::TaskError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonically increasing completion counter owned by an external device.
pub trait Fence: Send + Sync {
    /// Returns the highest value the device has completed.
    fn completed_value(&self) -> u64;
}

/// A fence advanced by hand. Useful for devices that report completion
/// through callbacks, and in tests.
#[derive(Debug, Default)]
pub struct ManualFence {
    value: AtomicU64,
}

impl ManualFence {
    /// Creates a fence at value zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the completed value. Lower values are ignored.
    pub fn signal(&self, value: u64) {
        self.value.fetch_max(value, Ordering::AcqRel);
    }
}

impl Fence for ManualFence {
    fn completed_value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

struct Watch {
    fence: Arc<dyn Fence>,
    value: u64,
    barrier: TaskBarrier,
}

/// Signals barriers once their fence reaches a target value.
#[derive(Default)]
pub struct FenceWatcher {
    watches: Mutex<Vec<Watch>>,
}

impl FenceWatcher {
    /// Creates a watcher with nothing to watch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one dependency to `barrier`, released once `fence` reaches `value`.
    ///
    /// # Panics
    ///
    /// Panics if `barrier` has already signaled.
    pub fn signal_on(&self, fence: Arc<dyn Fence>, value: u64, barrier: &TaskBarrier) {
        barrier.add_dependencies(1);
        self.watches.lock().push(Watch {
            fence,
            value,
            barrier: barrier.clone(),
        });
    }

    /// Returns a new barrier that signals once `fence` reaches `value`.
    pub fn barrier_for(&self, fence: Arc<dyn Fence>, value: u64) -> TaskBarrier {
        let barrier = TaskBarrier::new(1);
        self.watches.lock().push(Watch {
            fence,
            value,
            barrier: barrier.clone(),
        });
        barrier
    }

    /// Releases every watch whose fence has reached its value. Returns how many were released.
    pub fn poll(&self) -> usize {
        let reached: Vec<Watch> = {
            let mut watches = self.watches.lock();
            let (reached, waiting): (Vec<Watch>, Vec<Watch>) = std::mem::take(&mut *watches)
                .into_iter()
                .partition(|w| w.fence.completed_value() >= w.value);
            *watches = waiting;
            reached
        };
        // Decrement outside the lock: barrier callbacks may register new watches.
        for watch in &reached {
            watch.barrier.decrement();
        }
        reached.len()
    }

    /// Fails every outstanding watch with `error`. Used when the device is lost.
    pub fn fail_all(&self, error: TaskError) -> usize {
        let watches = std::mem::take(&mut *self.watches.lock());
        for watch in &watches {
            watch.barrier.fail(error.clone());
        }
        watches.len()
    }

    /// Returns the number of watches not yet released.
    pub fn pending(&self) -> usize {
        self.watches.lock().len()
    }
}

impl std::fmt::Debug for FenceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FenceWatcher")
            .field("pending", &self.pending())
            .finish()
    }
}
