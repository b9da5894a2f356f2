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

//! Errors reported by the system collection and frame processor.

use thiserror::Error;
use weft_assets::CacheError;
use weft_core::TaskError;

/// An error from a system collection or frame processor operation.
#[derive(Debug, Error)]
pub enum SystemError {
    /// `load::<T>` was called for a resource type with no registered cache.
    #[error("no resource cache is registered for {0}")]
    MissingCache(&'static str),

    /// A system of the same type was already added.
    #[error("a system of type {0} is already registered")]
    DuplicateSystem(&'static str),

    /// A frame operation ran before any frame was set.
    #[error("no frame has been set")]
    NoFrame,

    /// A system's startup work failed.
    #[error("system '{system}' failed to start: {source}")]
    Startup {
        /// Name of the failing system.
        system: String,
        /// The failure reported by its readiness barrier.
        source: TaskError,
    },

    /// A resource cache rejected the request.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A task or task group failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}
