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

//! Loaders turn [`LoadParams`] into resources, in one or two stages.
//!
//! `decode` always runs on a blocking-I/O worker. `finalize` runs right after
//! it on the same worker, unless the loader asks for the main thread (for
//! example to upload decoded pixels through the graphics context).

use crate::params::LoadParams;
use crate::Asset;
use std::fmt;
use std::marker::PhantomData;

/// Produces resources of one type for a [`ResourceCache`](crate::ResourceCache).
pub trait ResourceLoader: Send + Sync + 'static {
    /// The cached resource type.
    type Resource: Asset;
    /// Intermediate data handed from `decode` to `finalize`.
    type Staged: Send + 'static;

    /// Reads and decodes the source. Runs on a blocking-I/O worker.
    fn decode(&self, params: &LoadParams) -> anyhow::Result<Self::Staged>;

    /// Turns decoded data into the final resource.
    fn finalize(&self, staged: Self::Staged, params: &LoadParams)
        -> anyhow::Result<Self::Resource>;

    /// Whether `finalize` must run on the main thread.
    fn finalize_on_main_thread(&self) -> bool {
        false
    }
}

/// A single-stage loader built from a closure.
///
/// ```
/// use weft_assets::{Asset, FnLoader, LoadParams, ResourceLoader};
///
/// struct Text(String);
/// impl Asset for Text {}
///
/// let loader = FnLoader::new(|params: &LoadParams| Ok(Text(params.canonical_source())));
/// let params = LoadParams::new("a/./b.txt");
/// let staged = loader.decode(&params).unwrap();
/// assert_eq!(loader.finalize(staged, &params).unwrap().0, "a/b.txt");
/// ```
pub struct FnLoader<T, F> {
    load: F,
    main_thread: bool,
    _resource: PhantomData<fn() -> T>,
}

impl<T, F> FnLoader<T, F>
where
    T: Asset,
    F: Fn(&LoadParams) -> anyhow::Result<T> + Send + Sync + 'static,
{
    /// Wraps `load`; it runs on an I/O worker.
    pub fn new(load: F) -> Self {
        Self {
            load,
            main_thread: false,
            _resource: PhantomData,
        }
    }

    /// Wraps `load`; it runs on the main thread.
    pub fn on_main_thread(load: F) -> Self {
        Self {
            load,
            main_thread: true,
            _resource: PhantomData,
        }
    }
}

impl<T, F> ResourceLoader for FnLoader<T, F>
where
    T: Asset,
    F: Fn(&LoadParams) -> anyhow::Result<T> + Send + Sync + 'static,
{
    type Resource = T;
    type Staged = ();

    fn decode(&self, _params: &LoadParams) -> anyhow::Result<()> {
        Ok(())
    }

    fn finalize(&self, _staged: (), params: &LoadParams) -> anyhow::Result<T> {
        (self.load)(params)
    }

    fn finalize_on_main_thread(&self) -> bool {
        self.main_thread
    }
}

impl<T, F> fmt::Debug for FnLoader<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader")
            .field("resource", &std::any::type_name::<T>())
            .field("main_thread", &self.main_thread)
            .finish()
    }
}
