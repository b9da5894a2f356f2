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

//! Type-erased access to a resource cache, keyed only by the resource type.

use crate::error::CacheError;
use crate::handle::ResourceHandle;
use crate::loader::ResourceLoader;
use crate::params::LoadParams;
use crate::stats::CacheStatsSnapshot;
use crate::{Asset, ResourceCache};
use weft_core::task::TaskId;
use weft_core::TaskQueue;

/// The loading interface of a cache of `A`, independent of its loader type.
///
/// This is what a system collection stores for each resource type, so
/// callers can request a `Texture` without naming the texture loader.
pub trait ResourceProvider<A: Asset>: Send + Sync {
    /// See [`ResourceCache::load`].
    fn load(&self, params: &LoadParams, queue: &TaskQueue)
        -> Result<ResourceHandle<A>, CacheError>;

    /// See [`ResourceCache::load_async`].
    fn load_async(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<A>, CacheError>;

    /// See [`ResourceCache::async_load_deferred`].
    fn async_load_deferred(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<(Option<TaskId>, ResourceHandle<A>), CacheError>;

    /// See [`ResourceCache::add`].
    fn add(&self, params: &LoadParams, resource: A) -> Result<ResourceHandle<A>, CacheError>;

    /// See [`ResourceCache::clear`].
    fn clear(&self) -> usize;

    /// See [`ResourceCache::stats`].
    fn stats(&self) -> CacheStatsSnapshot;
}

impl<L: ResourceLoader> ResourceProvider<L::Resource> for ResourceCache<L> {
    fn load(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<L::Resource>, CacheError> {
        ResourceCache::load(self, params, queue)
    }

    fn load_async(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<L::Resource>, CacheError> {
        ResourceCache::load_async(self, params, queue)
    }

    fn async_load_deferred(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<(Option<TaskId>, ResourceHandle<L::Resource>), CacheError> {
        ResourceCache::async_load_deferred(self, params, queue)
    }

    fn add(
        &self,
        params: &LoadParams,
        resource: L::Resource,
    ) -> Result<ResourceHandle<L::Resource>, CacheError> {
        ResourceCache::add(self, params, resource)
    }

    fn clear(&self) -> usize {
        ResourceCache::clear(self)
    }

    fn stats(&self) -> CacheStatsSnapshot {
        ResourceCache::stats(self)
    }
}
