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

//! Metric primitives shared by the pool, the resource caches and the telemetry crate.

use std::fmt;

/// Identifies one metric: `namespace:name[label=value,...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    /// Subsystem the metric belongs to, e.g. `"pool"` or `"cache"`.
    pub namespace: String,
    /// Metric name within the namespace, e.g. `"tasks_completed"`.
    pub name: String,
    /// Dimension labels, kept sorted by key.
    pub labels: Vec<(String, String)>,
}

impl MetricId {
    /// Creates an unlabeled metric id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Adds a label, keeping labels sorted so equal ids hash equally.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let position = self
            .labels
            .binary_search_by(|(existing, _)| existing.as_str().cmp(&key))
            .unwrap_or_else(|insert_at| insert_at);
        self.labels.insert(position, (key, value.into()));
        self
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            f.write_str("[")?;
            for (i, (k, v)) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// A sampled metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Monotonic count.
    Counter(u64),
    /// Point-in-time level.
    Gauge(f64),
}

impl MetricValue {
    /// Returns the value as a float, whatever its kind.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Counter(v) => v as f64,
            MetricValue::Gauge(v) => v,
        }
    }
}

/// Something that can report its current counters.
///
/// Implemented by the pool and resource-cache statistics so a telemetry
/// service can sample them without knowing their concrete types.
pub trait StatSource: Send + Sync {
    /// Returns the current value of every metric this source exposes.
    fn sample(&self) -> Vec<(MetricId, MetricValue)>;
}
