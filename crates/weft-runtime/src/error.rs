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

//! Errors reported while configuring and running a runtime.

use std::path::PathBuf;
use thiserror::Error;
use weft_core::TaskError;
use weft_systems::SystemError;

/// An error in the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{}'", path.display())]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for a runtime config.
    #[error("failed to parse config{}", origin.as_ref().map(|p| format!(" '{}'", p.display())).unwrap_or_default())]
    Parse {
        /// The file the text came from, if any.
        origin: Option<PathBuf>,
        /// The underlying error.
        source: toml::de::Error,
    },

    /// An environment override holds an unusable value.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// Its value.
        value: String,
    },
}

/// An error from a [`Runtime`](crate::Runtime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker threads could not be spawned.
    #[error("failed to start the thread pool")]
    Pool(#[source] std::io::Error),

    /// A system or frame operation failed.
    #[error(transparent)]
    System(#[from] SystemError),

    /// A waited-on task failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}
