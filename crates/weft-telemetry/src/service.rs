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

//! Periodic sampling of runtime statistics into the metrics registry.

use crate::metrics::MetricsRegistry;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use weft_core::telemetry::StatSource;

/// Telemetry settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Whether `tick` samples at all.
    pub enabled: bool,
    /// Minimum time between two samples, in milliseconds.
    pub interval_ms: u64,
    /// Whether each sample is followed by an `info` summary in the log.
    pub log_summary: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            log_summary: false,
        }
    }
}

impl TelemetryConfig {
    /// Returns the sampling interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Samples registered stat sources into a [`MetricsRegistry`].
pub struct TelemetryService {
    metrics: MetricsRegistry,
    sources: Vec<Arc<dyn StatSource>>,
    config: TelemetryConfig,
    last_update: Option<Instant>,
}

impl TelemetryService {
    /// Creates a service with the given settings.
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            metrics: MetricsRegistry::new(),
            sources: Vec::new(),
            config,
            last_update: None,
        }
    }

    /// Adds a source sampled on every due tick.
    pub fn register(&mut self, source: Arc<dyn StatSource>) {
        self.sources.push(source);
        log::debug!("Registered stat source #{}.", self.sources.len());
    }

    /// Should be called periodically, e.g. once per frame.
    ///
    /// Samples every source if the interval has passed since the last
    /// sample. Returns `true` if it sampled.
    pub fn tick(&mut self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let due = self
            .last_update
            .map_or(true, |last| last.elapsed() >= self.config.interval());
        if !due {
            return false;
        }
        self.sample_now();
        if self.config.log_summary {
            self.log_summary();
        }
        true
    }

    /// Samples every source immediately. Returns the number of values recorded.
    pub fn sample_now(&mut self) -> usize {
        log::trace!("Sampling {} stat sources...", self.sources.len());
        let mut recorded = 0;
        for source in &self.sources {
            for (id, value) in source.sample() {
                match self.metrics.record(&id, value) {
                    Ok(()) => recorded += 1,
                    Err(err) => log::warn!("Dropped sample: {err}"),
                }
            }
        }
        self.last_update = Some(Instant::now());
        recorded
    }

    /// Renders every metric as one `id = value` line, sorted by id.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for metric in self.metrics.all() {
            let _ = writeln!(out, "{} = {}", metric.id, metric.value.as_f64());
        }
        out
    }

    /// Writes the summary to the log at `info` level.
    pub fn log_summary(&self) {
        log::info!("Telemetry:\n{}", self.summary().trim_end());
    }

    /// Returns the metrics registry.
    pub fn metrics_registry(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Returns the settings.
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Default for TelemetryService {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("sources", &self.sources.len())
            .field("metrics", &self.metrics.len())
            .field("config", &self.config)
            .finish()
    }
}
