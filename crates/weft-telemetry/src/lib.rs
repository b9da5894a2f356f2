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

//! # Weft Telemetry
//!
//! Logging initialisation, a metrics registry with counter and gauge
//! handles, and a [`TelemetryService`] that periodically samples the
//! statistics of pools and resource caches into that registry.

#![warn(missing_docs)]

pub mod logging;
pub mod metrics;
pub mod service;
pub mod storage;

pub use logging::{init_logging, LogTarget, LoggingConfig};
pub use metrics::{CounterHandle, GaugeHandle, Metric, MetricKind, MetricsError, MetricsRegistry};
pub use service::{TelemetryConfig, TelemetryService};
pub use storage::{InMemoryBackend, MetricsBackend};
