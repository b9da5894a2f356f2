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

//! Storage backends for the metrics registry.

use crate::metrics::{Metric, MetricKind, MetricsError, MetricsResult};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::time::Instant;
use weft_core::telemetry::{MetricId, MetricValue};

/// Storage for metrics.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Stores or replaces a metric.
    fn put(&self, metric: Metric);

    /// Returns a copy of the metric registered under `id`.
    fn get(&self, id: &MetricId) -> Option<Metric>;

    /// Returns a copy of every metric.
    fn list(&self) -> Vec<Metric>;

    /// Removes every metric.
    fn clear(&self);

    /// Returns the number of metrics.
    fn len(&self) -> usize;

    /// Adds `delta` to a counter and returns the new value.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut metric = self
            .get(id)
            .ok_or_else(|| MetricsError::NotFound(id.clone()))?;
        match metric.value {
            MetricValue::Counter(ref mut value) => {
                *value = value.saturating_add(delta);
                let result = *value;
                metric.updated = Instant::now();
                self.put(metric);
                Ok(result)
            }
            other => Err(MetricsError::TypeMismatch {
                id: id.clone(),
                expected: MetricKind::Counter,
                found: MetricKind::of(&other),
            }),
        }
    }

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, value: f64) -> MetricsResult<()> {
        let mut metric = self
            .get(id)
            .ok_or_else(|| MetricsError::NotFound(id.clone()))?;
        match metric.value {
            MetricValue::Gauge(ref mut gauge) => {
                *gauge = value;
                metric.updated = Instant::now();
                self.put(metric);
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                id: id.clone(),
                expected: MetricKind::Gauge,
                found: MetricKind::of(&other),
            }),
        }
    }
}

/// An in-memory backend: a map behind a read-write lock.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<AHashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put(&self, metric: Metric) {
        self.storage.write().insert(metric.id.clone(), metric);
    }

    fn get(&self, id: &MetricId) -> Option<Metric> {
        self.storage.read().get(id).cloned()
    }

    fn list(&self) -> Vec<Metric> {
        self.storage.read().values().cloned().collect()
    }

    fn clear(&self) {
        self.storage.write().clear();
    }

    fn len(&self) -> usize {
        self.storage.read().len()
    }
}
