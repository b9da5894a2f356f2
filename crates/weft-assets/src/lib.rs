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

//! # Weft Assets
//!
//! Asynchronous resource loading on top of `weft-core`: load parameters and
//! their cache keys, one- and two-stage loaders, and the deduplicating
//! [`ResourceCache`] that hands out [`ResourceHandle`]s before the resource
//! is ready.

#![warn(missing_docs)]

mod cache;
mod error;
mod handle;
mod loader;
mod params;
mod provider;
mod stats;

pub use cache::ResourceCache;
pub use error::CacheError;
pub use handle::ResourceHandle;
pub use loader::{FnLoader, ResourceLoader};
pub use params::{LoadParams, ResourceKey};
pub use provider::ResourceProvider;
pub use stats::{CacheStats, CacheStatsSnapshot};

/// A marker trait for types that can be stored in a resource cache.
///
/// Resources are shared between the loading threads and every handle holder,
/// so they must be `Send + Sync + 'static`.
///
/// ```
/// use weft_assets::Asset;
///
/// struct Texture {
///     pixels: Vec<u8>,
/// }
///
/// impl Asset for Texture {}
/// ```
pub trait Asset: Send + Sync + 'static {}
