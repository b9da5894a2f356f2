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

//! The deduplicating, reference-counted resource cache.
//!
//! Lookups take a shared read lock. A miss re-probes under an upgradable
//! read lock (exclusive among writers and other upgraders), then upgrades,
//! inserts a pending entry and only afterwards creates the load task. Every
//! concurrent requester of one key therefore gets the same pending handle,
//! and the loader runs at most once per key.

use crate::error::CacheError;
use crate::handle::{Entry, Release, ResourceHandle};
use crate::loader::ResourceLoader;
use crate::params::{LoadParams, ResourceKey};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use ahash::AHashMap;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::any::type_name;
use std::sync::{Arc, Weak};
use weft_core::future::Promise;
use weft_core::task::{TaskDesc, TaskId, TaskKind, ThreadRole};
use weft_core::{Future, TaskError, TaskQueue};

type EntryMap<T> = AHashMap<ResourceKey, Arc<Entry<T>>>;

struct CacheInner<L: ResourceLoader> {
    loader: L,
    entries: RwLock<EntryMap<L::Resource>>,
    stats: Arc<CacheStats>,
}

impl<L: ResourceLoader> CacheInner<L> {
    fn finalize(
        &self,
        staged: L::Staged,
        params: &LoadParams,
        promise: &Promise<L::Resource>,
    ) -> anyhow::Result<()> {
        match self.loader.finalize(staged, params) {
            Ok(resource) => {
                promise.set(resource);
                log::debug!("Loaded '{}'.", params.canonical_source());
                Ok(())
            }
            Err(error) => Self::fail(promise, params, error),
        }
    }

    fn fail(
        promise: &Promise<L::Resource>,
        params: &LoadParams,
        error: anyhow::Error,
    ) -> anyhow::Result<()> {
        let source = params.canonical_source();
        log::warn!("Failed to load '{source}': {error:#}");
        promise.fail(TaskError::failed(error));
        anyhow::bail!("loading '{source}' failed")
    }
}

impl<L: ResourceLoader> Release<L::Resource> for CacheInner<L> {
    fn release(&self, entry: &Arc<Entry<L::Resource>>) {
        let Some(key) = entry.key else {
            return;
        };
        let mut entries = self.entries.write();
        let evict = entries
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, entry) && entry.ref_count() == 0);
        if evict {
            entries.remove(&key);
            drop(entries);
            CacheStats::bump(&self.stats.evictions);
            log::trace!("Evicted resource {key}.");
        }
    }
}

/// A cache of resources produced by one loader, keyed by [`LoadParams::key`].
pub struct ResourceCache<L: ResourceLoader> {
    inner: Arc<CacheInner<L>>,
}

impl<L: ResourceLoader> Clone for ResourceCache<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: ResourceLoader> ResourceCache<L> {
    /// Creates an empty cache around `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                loader,
                entries: RwLock::new(AHashMap::new()),
                stats: Arc::new(CacheStats::new(type_name::<L::Resource>())),
            }),
        }
    }

    /// Returns the loader.
    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    fn handle(&self, entry: Arc<Entry<L::Resource>>) -> ResourceHandle<L::Resource> {
        let inner = Arc::downgrade(&self.inner);
        let owner: Weak<dyn Release<L::Resource>> = inner;
        ResourceHandle::from_entry(entry, Some(owner))
    }

    fn probe(&self, key: &ResourceKey) -> Option<ResourceHandle<L::Resource>> {
        let entry = self
            .inner
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.try_acquire())
            .cloned()?;
        Some(self.handle(entry))
    }

    /// Returns a handle to an existing entry without starting a load.
    pub fn get(&self, params: &LoadParams) -> Option<ResourceHandle<L::Resource>> {
        self.probe(&params.key())
    }

    /// Returns `true` if `params` has a live entry.
    pub fn contains(&self, params: &LoadParams) -> bool {
        self.inner
            .entries
            .read()
            .get(&params.key())
            .is_some_and(|entry| entry.ref_count() > 0)
    }

    /// Returns a handle for `params` immediately, plus the load task when this
    /// call created the entry.
    ///
    /// The task is made but not scheduled: the caller schedules it, possibly
    /// after declaring extra dependencies. A hit returns `None` for the task.
    pub fn async_load_deferred(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<(Option<TaskId>, ResourceHandle<L::Resource>), CacheError> {
        params.validate()?;
        let key = params.key();
        if let Some(handle) = self.probe(&key) {
            CacheStats::bump(&self.inner.stats.hits);
            log::trace!("Cache hit for '{}'.", params.canonical_source());
            return Ok((None, handle));
        }

        let entries = self.inner.entries.upgradable_read();
        let racing = entries
            .get(&key)
            .filter(|entry| entry.try_acquire())
            .cloned();
        if let Some(entry) = racing {
            drop(entries);
            CacheStats::bump(&self.inner.stats.hits);
            return Ok((None, self.handle(entry)));
        }

        let mut entries = RwLockUpgradableReadGuard::upgrade(entries);
        let promise = Promise::new();
        let entry = Arc::new(Entry::new(Some(key), promise.future()));
        // Replaces an entry whose last handle is being dropped, if any.
        entries.insert(key, entry.clone());
        drop(entries);

        CacheStats::bump(&self.inner.stats.misses);
        CacheStats::bump(&self.inner.stats.loads_started);
        log::debug!("Cache miss for '{}', loading.", params.canonical_source());

        let stats = self.inner.stats.clone();
        promise.barrier().set_callback(move |outcome| {
            if outcome.is_err() {
                CacheStats::bump(&stats.loads_failed);
            }
        });
        let task = self.make_load_task(queue, params.clone(), promise);
        Ok((Some(task), self.handle(entry)))
    }

    /// Returns a handle for `params` immediately and starts the load if needed.
    pub fn load_async(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<L::Resource>, CacheError> {
        let (task, handle) = self.async_load_deferred(params, queue)?;
        if let Some(task) = task {
            queue.schedule(task);
        }
        Ok(handle)
    }

    /// Loads `params` and waits for the result, running queued work meanwhile.
    pub fn load(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<L::Resource>, CacheError> {
        let handle = self.load_async(params, queue)?;
        queue.yield_until_finished(&handle)?;
        Ok(handle)
    }

    fn make_load_task(
        &self,
        queue: &TaskQueue,
        params: LoadParams,
        promise: Promise<L::Resource>,
    ) -> TaskId {
        let inner = self.inner.clone();
        let name = format!("load {}", params.canonical_source());
        queue.make(
            TaskDesc::new(move |task| {
                let staged = match inner.loader.decode(&params) {
                    Ok(staged) => staged,
                    Err(error) => return CacheInner::<L>::fail(&promise, &params, error),
                };
                if inner.loader.finalize_on_main_thread() && task.role != ThreadRole::Main {
                    let name = format!("finalize {}", params.canonical_source());
                    task.queue.submit(
                        TaskDesc::new(move |_| inner.finalize(staged, &params, &promise))
                            .kind(TaskKind::MainThread)
                            .name(name),
                    );
                    Ok(())
                } else {
                    inner.finalize(staged, &params, &promise)
                }
            })
            .kind(TaskKind::FileIo)
            .name(name),
        )
    }

    /// Inserts an already built resource under `params`' key.
    pub fn add(
        &self,
        params: &LoadParams,
        resource: L::Resource,
    ) -> Result<ResourceHandle<L::Resource>, CacheError> {
        params.validate()?;
        let key = params.key();
        let mut entries = self.inner.entries.write();
        if entries.get(&key).is_some_and(|entry| entry.ref_count() > 0) {
            return Err(CacheError::Duplicate { key });
        }
        let entry = Arc::new(Entry::new(Some(key), Future::ready(resource)));
        entries.insert(key, entry.clone());
        drop(entries);
        Ok(self.handle(entry))
    }

    /// Wraps a resource in a handle without registering it under any key.
    pub fn add_unkeyed(&self, resource: L::Resource) -> ResourceHandle<L::Resource> {
        ResourceHandle::from_entry(Arc::new(Entry::new(None, Future::ready(resource))), None)
    }

    /// Drops `handle` and removes its entry from the lookup map.
    ///
    /// Other handles keep the resource alive, but the next load of the same
    /// key starts a fresh load. Returns `true` if an entry was removed.
    pub fn unload(&self, handle: ResourceHandle<L::Resource>) -> bool {
        let removed = match handle.key() {
            Some(key) => {
                let mut entries = self.inner.entries.write();
                let owned = entries
                    .get(&key)
                    .is_some_and(|current| Arc::ptr_eq(current, handle.entry()));
                if owned {
                    entries.remove(&key);
                }
                owned
            }
            None => false,
        };
        drop(handle);
        removed
    }

    /// Detaches every entry. Returns how many were removed.
    ///
    /// Outstanding handles stay valid. Loads still in flight complete into
    /// their detached entries; callers normally drain them first.
    pub fn clear(&self) -> usize {
        let drained: Vec<Arc<Entry<L::Resource>>> = self
            .inner
            .entries
            .write()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let loading = drained.iter().filter(|e| !e.future.is_ready()).count();
        if loading > 0 {
            log::warn!(
                "Cleared the {} cache with {loading} loads still in flight.",
                type_name::<L::Resource>()
            );
        }
        drained.len()
    }

    /// Returns the number of keyed entries.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns `true` if the cache holds no keyed entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the cache counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Returns the live counters, for registration with a telemetry service.
    pub fn stat_source(&self) -> Arc<CacheStats> {
        self.inner.stats.clone()
    }
}

impl<L: ResourceLoader> std::fmt::Debug for ResourceCache<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("resource", &type_name::<L::Resource>())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Asset, FnLoader};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use weft_core::{PoolConfig, TaskBarrier, ThreadPool};

    #[derive(Debug)]
    struct Number(u32);
    impl Asset for Number {}

    struct Tracked {
        drops: Arc<AtomicUsize>,
    }
    impl Asset for Tracked {}
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool() -> ThreadPool {
        ThreadPool::start(PoolConfig::default().with_workers(2).with_io_threads(2)).unwrap()
    }

    #[test]
    fn three_threads_share_one_load() {
        let pool = pool();
        let decodes = Arc::new(AtomicUsize::new(0));
        let counter = decodes.clone();
        let cache = ResourceCache::new(FnLoader::new(move |_: &LoadParams| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            Ok(Number(42))
        }));
        let start = Arc::new(std::sync::Barrier::new(3));

        let requesters: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                let queue = pool.queue().clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    let handle = cache.load_async(&LoadParams::new("A"), &queue).unwrap();
                    assert_eq!(handle.wait().unwrap().0, 42);
                    handle
                })
            })
            .collect();
        let handles: Vec<_> = requesters.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| h.ptr_eq(&handles[0])));
        assert_eq!(handles[0].ref_count(), 3);
        let stats = cache.stats();
        assert_eq!(stats.loads_started, 1);
        assert_eq!(stats.hits + stats.misses, 3);
    }

    #[test]
    fn blocking_and_deferred_requesters_share_one_decode() {
        let pool = pool();
        let decodes = Arc::new(AtomicUsize::new(0));
        let counter = decodes.clone();
        let cache = ResourceCache::new(FnLoader::new(move |_: &LoadParams| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            Ok(Number(42))
        }));
        let start = Arc::new(std::sync::Barrier::new(8));

        let requesters: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let queue = pool.queue().clone();
                let start = start.clone();
                thread::spawn(move || {
                    let params = LoadParams::new("A");
                    start.wait();
                    let handle = if i % 2 == 0 {
                        cache.load(&params, &queue).unwrap()
                    } else {
                        let (task, handle) = cache.async_load_deferred(&params, &queue).unwrap();
                        if let Some(task) = task {
                            queue.schedule(task);
                        }
                        handle
                    };
                    assert_eq!(handle.wait().unwrap().0, 42);
                    handle
                })
            })
            .collect();
        let handles: Vec<_> = requesters.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| h.ptr_eq(&handles[0])));
        assert_eq!(handles[0].ref_count(), 8);
        assert_eq!(cache.stats().loads_started, 1);
    }

    #[test]
    fn release_to_zero_evicts_but_frees_only_after_load() {
        let pool = pool();
        let drops = Arc::new(AtomicUsize::new(0));
        let gate = TaskBarrier::new(1);

        let tracked = drops.clone();
        let loader_gate = gate.clone();
        let cache = ResourceCache::new(FnLoader::new(move |_: &LoadParams| {
            loader_gate.wait()?;
            Ok(Tracked {
                drops: tracked.clone(),
            })
        }));

        let first = cache.load_async(&LoadParams::new("mesh.obj"), pool.queue()).unwrap();
        let second = first.clone();
        assert_eq!(first.ref_count(), 2);
        assert_eq!(cache.len(), 1);

        drop(first);
        assert_eq!(cache.len(), 1);
        drop(second);
        assert_eq!(cache.len(), 0, "lookup entry removed at zero references");
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        gate.decrement();
        pool.queue().yield_until_idle();
        assert_eq!(drops.load(Ordering::SeqCst), 1, "resource freed once the load finished");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn failed_load_is_retried_after_eviction() {
        let pool = pool();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let cache = ResourceCache::new(FnLoader::new(move |_: &LoadParams| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("truncated file");
            }
            Ok(Number(7))
        }));
        let params = LoadParams::new("level.bin");

        let failed = cache.load_async(&params, pool.queue()).unwrap();
        let err = failed.wait().unwrap_err();
        assert!(err.to_string().contains("truncated file"));

        let same = cache.load_async(&params, pool.queue()).unwrap();
        assert!(same.ptr_eq(&failed), "failed entry stays while handles live");
        assert!(matches!(
            cache.load(&params, pool.queue()),
            Err(CacheError::Load(_))
        ));

        drop(failed);
        drop(same);
        assert!(cache.is_empty());

        let retried = cache.load(&params, pool.queue()).unwrap();
        assert_eq!(retried.get().unwrap().0, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        pool.queue().yield_until_idle();
        assert_eq!(cache.stats().loads_failed, 1);
    }

    #[test]
    fn deferred_load_waits_for_schedule() {
        let pool = pool();
        let cache = ResourceCache::new(FnLoader::new(|_: &LoadParams| Ok(Number(1))));
        let params = LoadParams::new("deferred.bin");

        let (task, handle) = cache.async_load_deferred(&params, pool.queue()).unwrap();
        let task = task.expect("first request creates the task");
        pool.queue().yield_for(Duration::from_millis(5));
        assert!(!handle.is_ready());

        let (again, same) = cache.async_load_deferred(&params, pool.queue()).unwrap();
        assert!(again.is_none());
        assert!(same.ptr_eq(&handle));

        pool.queue().schedule(task);
        assert_eq!(handle.wait().unwrap().0, 1);
    }

    #[test]
    fn main_thread_finalize_runs_on_the_main_thread() {
        let pool = pool();
        let main = thread::current().id();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = seen.clone();
        let probe = ResourceCache::new(FnLoader::on_main_thread(move |_: &LoadParams| {
            *slot.lock() = Some(thread::current().id());
            Ok(Number(2))
        }));

        let handle = probe.load(&LoadParams::new("texture.png"), pool.queue()).unwrap();
        assert_eq!(handle.get().unwrap().0, 2);
        assert_eq!(*seen.lock(), Some(main));
    }

    #[test]
    fn add_rejects_duplicates_and_serves_hits() {
        let pool = pool();
        let cache = ResourceCache::new(FnLoader::new(|_: &LoadParams| Ok(Number(0))));
        let params = LoadParams::new("builtin/white.png");

        let added = cache.add(&params, Number(255)).unwrap();
        assert!(matches!(
            cache.add(&params, Number(1)),
            Err(CacheError::Duplicate { .. })
        ));
        let loaded = cache.load(&params, pool.queue()).unwrap();
        assert!(loaded.ptr_eq(&added));
        assert_eq!(loaded.get().unwrap().0, 255);
        assert_eq!(cache.stats().loads_started, 0);

        let unkeyed = cache.add_unkeyed(Number(3));
        assert!(unkeyed.key().is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unload_forces_a_fresh_load() {
        let pool = pool();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let cache = ResourceCache::new(FnLoader::new(move |_: &LoadParams| {
            Ok(Number(counter.fetch_add(1, Ordering::SeqCst) as u32))
        }));
        let params = LoadParams::new("shader.wgsl");

        let first = cache.load(&params, pool.queue()).unwrap();
        let keep = first.clone();
        assert!(cache.unload(first));
        assert!(cache.is_empty());
        assert_eq!(keep.get().unwrap().0, 0);

        let second = cache.load(&params, pool.queue()).unwrap();
        assert!(!second.ptr_eq(&keep));
        assert_eq!(second.get().unwrap().0, 1);
    }

    #[test]
    fn clear_detaches_entries_still_loading() {
        let pool = pool();
        let gate = TaskBarrier::new(1);
        let loader_gate = gate.clone();
        let cache = ResourceCache::new(FnLoader::new(move |_: &LoadParams| {
            loader_gate.wait()?;
            Ok(Number(9))
        }));
        let pending = cache.load_async(&LoadParams::new("slow.bin"), pool.queue()).unwrap();

        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());

        gate.decrement();
        assert_eq!(pending.wait().unwrap().0, 9);
        let fresh = cache.load(&LoadParams::new("slow.bin"), pool.queue()).unwrap();
        assert!(!fresh.ptr_eq(&pending));
        assert_eq!(cache.stats().loads_started, 2);

        drop(pending);
        assert_eq!(cache.len(), 1);
        assert_eq!(fresh.get().unwrap().0, 9);
    }

    #[test]
    fn invalid_params_fail_before_any_task() {
        let pool = pool();
        let cache = ResourceCache::new(FnLoader::new(|_: &LoadParams| Ok(Number(0))));
        assert!(matches!(
            cache.load_async(&LoadParams::new(""), pool.queue()),
            Err(CacheError::Configuration(_))
        ));
        assert_eq!(pool.queue().in_flight(), 0);
        assert_eq!(cache.stats().loads_started, 0);
    }
}
