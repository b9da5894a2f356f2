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

//! Reference-counted handles to cached resources.

use crate::params::ResourceKey;
use crate::Asset;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use weft_core::{AsBarrier, Future, TaskBarrier, TaskResult};

/// One cache slot: the resource future plus the number of live handles.
pub(crate) struct Entry<T> {
    pub(crate) key: Option<ResourceKey>,
    refs: AtomicUsize,
    pub(crate) future: Future<T>,
}

impl<T> Entry<T> {
    /// Creates an entry owned by one handle.
    pub(crate) fn new(key: Option<ResourceKey>, future: Future<T>) -> Self {
        Self {
            key,
            refs: AtomicUsize::new(1),
            future,
        }
    }

    /// Takes a new reference unless the count already dropped to zero.
    ///
    /// An entry at zero is being evicted and must not be revived.
    pub(crate) fn try_acquire(&self) -> bool {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n > 0).then_some(n + 1)
            })
            .is_ok()
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }
}

/// Receives the entries whose last handle was dropped.
pub(crate) trait Release<T>: Send + Sync {
    fn release(&self, entry: &Arc<Entry<T>>);
}

/// A handle to a cached resource that may still be loading.
///
/// Handles are returned immediately by the cache; the resource becomes
/// readable once the handle's barrier signals. Cloning a handle adds a
/// reference; dropping the last one removes the cache entry.
pub struct ResourceHandle<T: Asset> {
    entry: Arc<Entry<T>>,
    owner: Option<Weak<dyn Release<T>>>,
}

impl<T: Asset> ResourceHandle<T> {
    /// Wraps an entry whose reference was already counted.
    pub(crate) fn from_entry(entry: Arc<Entry<T>>, owner: Option<Weak<dyn Release<T>>>) -> Self {
        Self { entry, owner }
    }

    pub(crate) fn entry(&self) -> &Arc<Entry<T>> {
        &self.entry
    }

    /// Returns the cache key, or `None` for resources added without one.
    pub fn key(&self) -> Option<ResourceKey> {
        self.entry.key
    }

    /// Returns `true` once the load has finished, successfully or not.
    pub fn is_ready(&self) -> bool {
        self.entry.future.is_ready()
    }

    /// Reads the resource.
    ///
    /// # Panics
    ///
    /// Panics if the load has not finished. Wait on the handle first.
    pub fn get(&self) -> TaskResult<&T> {
        self.entry.future.get()
    }

    /// Reads the resource, or returns `None` while it is loading.
    pub fn try_get(&self) -> Option<TaskResult<&T>> {
        self.entry.future.try_get()
    }

    /// Blocks until the load finishes, then reads the resource.
    pub fn wait(&self) -> TaskResult<&T> {
        self.entry.future.wait()
    }

    /// Returns the future backing this handle.
    pub fn future(&self) -> &Future<T> {
        &self.entry.future
    }

    /// Returns the number of live handles to this resource.
    pub fn ref_count(&self) -> usize {
        self.entry.ref_count()
    }

    /// Returns `true` if both handles share one cache entry.
    pub fn ptr_eq(&self, other: &ResourceHandle<T>) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl<T: Asset> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        self.entry.refs.fetch_add(1, Ordering::AcqRel);
        Self {
            entry: self.entry.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<T: Asset> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        if self.entry.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
            owner.release(&self.entry);
        }
    }
}

impl<T: Asset> AsBarrier for ResourceHandle<T> {
    fn as_barrier(&self) -> &TaskBarrier {
        self.entry.future.barrier()
    }
}

impl<T: Asset> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.entry.key)
            .field("ready", &self.is_ready())
            .field("refs", &self.ref_count())
            .finish()
    }
}
