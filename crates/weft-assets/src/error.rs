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

//! Errors reported by resource caches.

use crate::params::ResourceKey;
use thiserror::Error;
use weft_core::TaskError;

/// An error from a resource cache operation.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The load parameters are unusable. Reported before any task is created.
    #[error("invalid load parameters: {0}")]
    Configuration(String),

    /// `add` was called with a key that already has a live entry.
    #[error("resource {key} is already cached")]
    Duplicate {
        /// The key that is already present.
        key: ResourceKey,
    },

    /// The load ran and failed, or never ran.
    #[error("resource load failed: {0}")]
    Load(#[from] TaskError),
}
