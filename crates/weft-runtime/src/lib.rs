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

//! # Weft Runtime
//!
//! Ties the Weft crates together for an application: a [`RuntimeConfig`]
//! loaded from TOML and the environment, and a [`Runtime`] that owns the
//! thread pool, the system collection and telemetry.

#![warn(missing_docs)]

pub mod config;
pub mod error;
mod runtime;

pub use config::RuntimeConfig;
pub use error::{ConfigError, RuntimeError};
pub use runtime::Runtime;
