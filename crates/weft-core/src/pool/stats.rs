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

//! Lock-free counters describing pool activity.

use crate::telemetry::{MetricId, MetricValue, StatSource};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the pool's threads.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub(crate) scheduled: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) cancelled: AtomicU64,
    pub(crate) main_thread: AtomicU64,
}

/// A point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Tasks handed to `schedule`.
    pub tasks_scheduled: u64,
    /// Task bodies that ran to completion, successfully or not.
    pub tasks_completed: u64,
    /// Task bodies that returned an error or panicked.
    pub tasks_failed: u64,
    /// Tasks whose body was skipped because a dependency failed.
    pub tasks_skipped: u64,
    /// Tasks dropped by shutdown.
    pub tasks_cancelled: u64,
    /// Bodies executed on the main thread.
    pub main_thread_tasks: u64,
}

impl PoolStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            tasks_scheduled: self.scheduled.load(Ordering::Relaxed),
            tasks_completed: self.completed.load(Ordering::Relaxed),
            tasks_failed: self.failed.load(Ordering::Relaxed),
            tasks_skipped: self.skipped.load(Ordering::Relaxed),
            tasks_cancelled: self.cancelled.load(Ordering::Relaxed),
            main_thread_tasks: self.main_thread.load(Ordering::Relaxed),
        }
    }
}

impl StatSource for PoolStats {
    fn sample(&self) -> Vec<(MetricId, MetricValue)> {
        let s = self.snapshot();
        [
            ("tasks_scheduled", s.tasks_scheduled),
            ("tasks_completed", s.tasks_completed),
            ("tasks_failed", s.tasks_failed),
            ("tasks_skipped", s.tasks_skipped),
            ("tasks_cancelled", s.tasks_cancelled),
            ("main_thread_tasks", s.main_thread_tasks),
        ]
        .into_iter()
        .map(|(name, value)| (MetricId::new("pool", name), MetricValue::Counter(value)))
        .collect()
    }
}
