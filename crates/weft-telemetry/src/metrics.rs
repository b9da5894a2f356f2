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

//! Registry for managing metrics.

use crate::storage::{InMemoryBackend, MetricsBackend};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use weft_core::telemetry::{MetricId, MetricValue};

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonic count.
    Counter,
    /// Point-in-time level.
    Gauge,
}

impl MetricKind {
    /// Returns the kind of `value`.
    pub fn of(value: &MetricValue) -> Self {
        match value {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// An error from the metrics registry or its backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// No metric is registered under the id.
    #[error("metric not found: {0}")]
    NotFound(MetricId),
    /// The operation does not apply to the metric's kind.
    #[error("type mismatch on {id}: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// The metric.
        id: MetricId,
        /// The kind the operation needs.
        expected: MetricKind,
        /// The kind actually stored.
        found: MetricKind,
    },
}

/// Result type of metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// A stored metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// The metric's identity.
    pub id: MetricId,
    /// Human-readable description.
    pub description: String,
    /// The latest value.
    pub value: MetricValue,
    /// When the value last changed.
    pub updated: Instant,
}

impl Metric {
    /// Creates a metric with the given initial value.
    pub fn new(id: MetricId, description: impl Into<String>, value: MetricValue) -> Self {
        Self {
            id,
            description: description.into(),
            value,
            updated: Instant::now(),
        }
    }

    /// Returns the metric's kind.
    pub fn kind(&self) -> MetricKind {
        MetricKind::of(&self.value)
    }
}

/// Central registry for the metrics of one runtime.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsRegistry {
    /// Creates a registry over the default in-memory backend.
    pub fn new() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
        }
    }

    /// Registers a counter starting at zero.
    pub fn register_counter(&self, id: MetricId, description: &str) -> CounterHandle {
        self.backend
            .put(Metric::new(id.clone(), description, MetricValue::Counter(0)));
        CounterHandle {
            id,
            backend: self.backend.clone(),
        }
    }

    /// Registers a gauge starting at zero.
    pub fn register_gauge(&self, id: MetricId, description: &str) -> GaugeHandle {
        self.backend
            .put(Metric::new(id.clone(), description, MetricValue::Gauge(0.0)));
        GaugeHandle {
            id,
            backend: self.backend.clone(),
        }
    }

    /// Stores a sampled value, creating the metric on first use.
    ///
    /// Fails if the metric exists with another kind.
    pub fn record(&self, id: &MetricId, value: MetricValue) -> MetricsResult<()> {
        match self.backend.get(id) {
            Some(metric) if metric.kind() != MetricKind::of(&value) => {
                Err(MetricsError::TypeMismatch {
                    id: id.clone(),
                    expected: metric.kind(),
                    found: MetricKind::of(&value),
                })
            }
            Some(metric) => {
                self.backend.put(Metric {
                    value,
                    updated: Instant::now(),
                    ..metric
                });
                Ok(())
            }
            None => {
                self.backend.put(Metric::new(id.clone(), "", value));
                Ok(())
            }
        }
    }

    /// Returns the metric registered under `id`.
    pub fn get(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.backend
            .get(id)
            .ok_or_else(|| MetricsError::NotFound(id.clone()))
    }

    /// Returns `true` if a metric is registered under `id`.
    pub fn contains(&self, id: &MetricId) -> bool {
        self.backend.get(id).is_some()
    }

    /// Returns every metric of `namespace`, sorted by id.
    pub fn namespace(&self, namespace: &str) -> Vec<Metric> {
        let mut metrics: Vec<_> = self
            .backend
            .list()
            .into_iter()
            .filter(|metric| metric.id.namespace == namespace)
            .collect();
        metrics.sort_by_key(|metric| metric.id.to_string());
        metrics
    }

    /// Returns every metric, sorted by id.
    pub fn all(&self) -> Vec<Metric> {
        let mut metrics = self.backend.list();
        metrics.sort_by_key(|metric| metric.id.to_string());
        metrics
    }

    /// Returns the number of metrics.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// Returns `true` if no metric is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every metric.
    pub fn clear(&self) {
        self.backend.clear();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for counter operations.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl CounterHandle {
    /// Increments the counter by 1.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.increment_by(1)
    }

    /// Increments the counter by `amount`.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, amount)
    }

    /// Returns the current value.
    pub fn get(&self) -> MetricsResult<u64> {
        match self.backend.get(&self.id).map(|metric| metric.value) {
            Some(MetricValue::Counter(value)) => Ok(value),
            Some(other) => Err(MetricsError::TypeMismatch {
                id: self.id.clone(),
                expected: MetricKind::Counter,
                found: MetricKind::of(&other),
            }),
            None => Err(MetricsError::NotFound(self.id.clone())),
        }
    }

    /// Returns the metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle for gauge operations.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl GaugeHandle {
    /// Sets the gauge.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend.set_gauge(&self.id, value)
    }

    /// Adds `delta` to the gauge and returns the new value.
    pub fn add(&self, delta: f64) -> MetricsResult<f64> {
        let value = self.get()? + delta;
        self.set(value)?;
        Ok(value)
    }

    /// Returns the current value.
    pub fn get(&self) -> MetricsResult<f64> {
        match self.backend.get(&self.id).map(|metric| metric.value) {
            Some(MetricValue::Gauge(value)) => Ok(value),
            Some(other) => Err(MetricsError::TypeMismatch {
                id: self.id.clone(),
                expected: MetricKind::Gauge,
                found: MetricKind::of(&other),
            }),
            None => Err(MetricsError::NotFound(self.id.clone())),
        }
    }

    /// Returns the metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let counter = registry.register_counter(
            MetricId::new("frame", "count"),
            "Frames processed",
        );

        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment_by(5).unwrap(), 6);
        assert_eq!(counter.get().unwrap(), 6);
        assert!(registry.contains(counter.id()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_gauge_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let gauge = registry.register_gauge(MetricId::new("pool", "queue_depth"), "Ready tasks");

        gauge.set(4.0).unwrap();
        assert_eq!(gauge.get().unwrap(), 4.0);
        assert_eq!(gauge.add(-1.5).unwrap(), 2.5);
    }

    #[test]
    fn test_record_creates_then_updates() {
        let registry = MetricsRegistry::new();
        let id = MetricId::new("cache", "hits").with_label("resource", "Mesh");

        registry.record(&id, MetricValue::Counter(3)).unwrap();
        registry.record(&id, MetricValue::Counter(5)).unwrap();
        assert_eq!(registry.get(&id).unwrap().value, MetricValue::Counter(5));

        let err = registry.record(&id, MetricValue::Gauge(1.0)).unwrap_err();
        assert!(matches!(err, MetricsError::TypeMismatch { .. }));
    }

    #[test]
    fn test_namespace_filtering_and_clear() {
        let registry = MetricsRegistry::new();
        registry.register_counter(MetricId::new("pool", "b"), "");
        registry.register_counter(MetricId::new("pool", "a"), "");
        registry.register_gauge(MetricId::new("cache", "size"), "");

        let pool: Vec<_> = registry
            .namespace("pool")
            .into_iter()
            .map(|metric| metric.id.name)
            .collect();
        assert_eq!(pool, vec!["a", "b"]);

        registry.clear();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get(&MetricId::new("pool", "a")),
            Err(MetricsError::NotFound(_))
        ));
    }

    #[test]
    fn test_reregistering_replaces_the_kind() {
        let registry = MetricsRegistry::new();
        let id = MetricId::new("frame", "time");
        registry.register_gauge(id.clone(), "");
        let counter = registry.register_counter(id.clone(), "");
        registry.record(&id, MetricValue::Counter(1)).unwrap();
        assert_eq!(counter.get().unwrap(), 1);
    }
}
