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

use std::sync::atomic::{AtomicU64, Ordering};
use weft_core::telemetry::{MetricId, MetricValue, StatSource};

/// Live counters of one resource cache.
#[derive(Debug)]
pub struct CacheStats {
    resource: &'static str,
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) loads_started: AtomicU64,
    pub(crate) loads_failed: AtomicU64,
    pub(crate) evictions: AtomicU64,
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that created an entry.
    pub misses: u64,
    /// Load tasks created.
    pub loads_started: u64,
    /// Loads that ended in an error or a panic.
    pub loads_failed: u64,
    /// Entries removed because their last handle was dropped.
    pub evictions: u64,
}

impl CacheStats {
    pub(crate) fn new(resource: &'static str) -> Self {
        Self {
            resource,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads_started: AtomicU64::new(0),
            loads_failed: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl StatSource for CacheStats {
    fn sample(&self) -> Vec<(MetricId, MetricValue)> {
        let s = self.snapshot();
        [
            ("hits", s.hits),
            ("misses", s.misses),
            ("loads_started", s.loads_started),
            ("loads_failed", s.loads_failed),
            ("evictions", s.evictions),
        ]
        .into_iter()
        .map(|(name, value)| {
            (
                MetricId::new("cache", name).with_label("resource", self.resource),
                MetricValue::Counter(value),
            )
        })
        .collect()
    }
}
