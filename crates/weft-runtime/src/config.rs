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

//! Layered runtime configuration: defaults, then a TOML file, then the
//! environment.
//!
//! ```toml
//! [pool]
//! worker_threads = 4
//! io_threads = 2
//!
//! [logging]
//! level = "info,weft_core=debug"
//! target = "stdout"
//!
//! [telemetry]
//! interval_ms = 500
//! log_summary = true
//! ```
//!
//! `WEFT_WORKERS`, `WEFT_IO_WORKERS` and `WEFT_LOG` override the matching
//! fields.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use weft_core::PoolConfig;
use weft_telemetry::{LoggingConfig, TelemetryConfig};

/// Overrides the CPU worker count.
pub const ENV_WORKERS: &str = "WEFT_WORKERS";
/// Overrides the I/O worker count.
pub const ENV_IO_WORKERS: &str = "WEFT_IO_WORKERS";
/// Overrides the log filter.
pub const ENV_LOG: &str = "WEFT_LOG";

/// Everything needed to start a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Thread pool settings.
    pub pool: PoolConfig,
    /// Logger settings.
    pub logging: LoggingConfig,
    /// Telemetry settings.
    pub telemetry: TelemetryConfig,
}

impl RuntimeConfig {
    /// Parses a config from TOML text. Missing sections keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: None,
            source,
        })
    }

    /// Reads and parses a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            origin: Some(path.to_path_buf()),
            source,
        })
    }

    /// Loads `path` if given and present, falls back to defaults otherwise,
    /// then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                log::debug!("Loading runtime config from '{}'.", path.display());
                Self::from_file(path)?
            }
            Some(path) => {
                log::debug!("No config at '{}'; using defaults.", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`, usually the environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_WORKERS) {
            self.pool.worker_threads = Some(parse_count(ENV_WORKERS, value)?);
        }
        if let Some(value) = lookup(ENV_IO_WORKERS) {
            self.pool.io_threads = parse_count(ENV_IO_WORKERS, value)?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.logging.level = value;
        }
        Ok(())
    }
}

fn parse_count(var: &'static str, value: String) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_telemetry::LogTarget;

    #[test]
    fn empty_text_yields_defaults() {
        assert_eq!(
            RuntimeConfig::from_toml_str("").unwrap(),
            RuntimeConfig::default()
        );
    }

    #[test]
    fn sections_override_their_fields_only() {
        let config = RuntimeConfig::from_toml_str(
            "[pool]\nworker_threads = 3\n\n[logging]\ntarget = \"stdout\"\n",
        )
        .unwrap();
        assert_eq!(config.pool.worker_threads, Some(3));
        assert_eq!(config.pool.io_threads, 2);
        assert_eq!(config.logging.target, LogTarget::Stdout);
        assert_eq!(config.logging.level, "info");
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = RuntimeConfig::from_toml_str("[pool]\nio_threads = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { origin: None, .. }));
    }

    #[test]
    fn overrides_win_over_the_file() {
        let mut config = RuntimeConfig::from_toml_str("[pool]\nworker_threads = 8").unwrap();
        config
            .apply_overrides(|var| match var {
                ENV_WORKERS => Some("2".to_owned()),
                ENV_LOG => Some("debug".to_owned()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.pool.worker_threads, Some(2));
        assert_eq!(config.pool.io_threads, 2);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_overrides(|var| (var == ENV_IO_WORKERS).then(|| "lots".to_owned()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: ENV_IO_WORKERS, .. }
        ));
    }
}
