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

//! Process-wide logger setup on top of `env_logger`.

use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use serde::Deserialize;

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
}

/// Logger settings. `RUST_LOG`, when set, takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, in `RUST_LOG` syntax (`"info"`, `"weft_core=debug"`).
    pub level: String,
    /// Output stream.
    pub target: LogTarget,
    /// Modules capped at `warn` whatever the level.
    pub quiet_modules: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            target: LogTarget::Stderr,
            quiet_modules: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Returns the config with `level` as the default filter.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Builds an `env_logger` builder from `config` without installing it.
pub fn builder(config: &LoggingConfig) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(config.level.as_str()));
    builder.target(match config.target {
        LogTarget::Stdout => Target::Stdout,
        LogTarget::Stderr => Target::Stderr,
    });
    for module in &config.quiet_modules {
        builder.filter_module(module, LevelFilter::Warn);
    }
    builder
}

/// Installs the global logger.
///
/// Returns `false` if a logger was already installed, in which case the
/// existing one is kept.
pub fn init_logging(config: &LoggingConfig) -> bool {
    match builder(config).try_init() {
        Ok(()) => {
            log::debug!("Logger initialised at '{}'.", config.level);
            true
        }
        Err(_) => false,
    }
}
