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

//! Thread pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`ThreadPool`](crate::pool::ThreadPool).
///
/// Deserializes from a `[pool]` table; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of CPU workers. `None` picks available parallelism minus one
    /// (the main thread), at least one.
    pub worker_threads: Option<usize>,
    /// Number of dedicated blocking-I/O workers. With zero, I/O tasks run on
    /// the CPU workers.
    pub io_threads: usize,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// How long an idle worker sleeps before rechecking for shutdown, in milliseconds.
    pub idle_poll_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            io_threads: 2,
            thread_name_prefix: "weft".to_string(),
            idle_poll_ms: 2,
        }
    }
}

impl PoolConfig {
    /// Sets an explicit CPU worker count.
    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Sets the I/O worker count.
    pub fn with_io_threads(mut self, count: usize) -> Self {
        self.io_threads = count;
        self
    }

    /// Returns the CPU worker count after applying the automatic default.
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Returns the idle poll interval, at least one millisecond.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}
