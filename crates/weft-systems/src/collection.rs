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

//! The registry of subsystems and of everything they share.
//!
//! A [`SystemCollection`] owns the systems and a [`SystemContext`]: named
//! task groups and barriers, typed interfaces, resource caches and the
//! [`FrameProcessor`]. Systems receive the context in their hooks, so they
//! can publish and look up shared pieces without knowing each other.

use crate::error::SystemError;
use crate::group::ParameterizedTaskGroup;
use crate::processor::{FrameProcessor, RenderParams, UpdateParams};
use crate::service_registry::ServiceRegistry;
use crate::system::System;
use crate::time::FrameTime;
use ahash::AHashMap;
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;
use weft_assets::{
    Asset, LoadParams, ResourceCache, ResourceHandle, ResourceLoader, ResourceProvider,
};
use weft_core::{TaskBarrier, TaskQueue};

/// State shared by every system of a collection.
pub struct SystemContext<F> {
    services: ServiceRegistry,
    update_groups: AHashMap<String, ParameterizedTaskGroup<UpdateParams<F>>>,
    render_groups: AHashMap<String, ParameterizedTaskGroup<RenderParams<F>>>,
    barriers: AHashMap<String, TaskBarrier>,
    frame_processor: FrameProcessor<F>,
}

impl<F: Send + Sync + 'static> SystemContext<F> {
    fn new() -> Self {
        Self {
            services: ServiceRegistry::new(),
            update_groups: AHashMap::new(),
            render_groups: AHashMap::new(),
            barriers: AHashMap::new(),
            frame_processor: FrameProcessor::new(),
        }
    }

    /// Publishes an interface, replacing any previous one of the same type.
    pub fn register_interface<I: ?Sized + Send + Sync + 'static>(&mut self, interface: Arc<I>) {
        log::debug!("Interface {} registered.", type_name::<I>());
        self.services.insert_shared(interface);
    }

    /// Looks up a published interface.
    pub fn query_interface<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        self.services.get_shared::<I>()
    }

    /// Returns the underlying service registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Returns the underlying service registry for direct insertion.
    pub fn services_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.services
    }

    /// Publishes the cache that serves resources of type `T`.
    pub fn add_cache_interface<T: Asset>(&mut self, cache: Arc<dyn ResourceProvider<T>>) {
        self.register_interface::<dyn ResourceProvider<T>>(cache);
    }

    /// Publishes `cache` as the cache of its loader's resource type.
    pub fn add_cache<L: ResourceLoader>(&mut self, cache: ResourceCache<L>) {
        self.add_cache_interface::<L::Resource>(Arc::new(cache));
    }

    /// Returns the cache serving resources of type `T`.
    pub fn get_cache<T: Asset>(&self) -> Option<Arc<dyn ResourceProvider<T>>> {
        self.query_interface::<dyn ResourceProvider<T>>()
    }

    /// Loads a `T` through its cache, blocking until it is ready.
    pub fn load<T: Asset>(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<T>, SystemError> {
        Ok(self.cache_for::<T>()?.load(params, queue)?)
    }

    /// Starts loading a `T` through its cache and returns its handle at once.
    pub fn load_async<T: Asset>(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<T>, SystemError> {
        Ok(self.cache_for::<T>()?.load_async(params, queue)?)
    }

    fn cache_for<T: Asset>(&self) -> Result<Arc<dyn ResourceProvider<T>>, SystemError> {
        self.get_cache::<T>()
            .ok_or(SystemError::MissingCache(type_name::<T>()))
    }

    /// Returns the update group named `name`, creating it and nesting it
    /// into the frame processor's update group on first use.
    pub fn create_update_group(&mut self, name: &str) -> ParameterizedTaskGroup<UpdateParams<F>> {
        let processor = &self.frame_processor;
        self.update_groups
            .entry(name.to_owned())
            .or_insert_with(|| {
                let group = ParameterizedTaskGroup::new(name);
                processor.add_update_group(&group);
                group
            })
            .clone()
    }

    /// Returns the render group named `name`, creating it and nesting it
    /// into the frame processor's render group on first use.
    pub fn create_render_group(&mut self, name: &str) -> ParameterizedTaskGroup<RenderParams<F>> {
        let processor = &self.frame_processor;
        self.render_groups
            .entry(name.to_owned())
            .or_insert_with(|| {
                let group = ParameterizedTaskGroup::new(name);
                processor.add_render_group(&group);
                group
            })
            .clone()
    }

    /// Returns the update group named `name`, if it exists.
    pub fn update_group(&self, name: &str) -> Option<ParameterizedTaskGroup<UpdateParams<F>>> {
        self.update_groups.get(name).cloned()
    }

    /// Returns the render group named `name`, if it exists.
    pub fn render_group(&self, name: &str) -> Option<ParameterizedTaskGroup<RenderParams<F>>> {
        self.render_groups.get(name).cloned()
    }

    /// Publishes a barrier under `name`, replacing any previous one.
    pub fn register_barrier(&mut self, name: impl Into<String>, barrier: TaskBarrier) {
        self.barriers.insert(name.into(), barrier);
    }

    /// Returns the barrier published under `name`.
    pub fn barrier(&self, name: &str) -> Option<TaskBarrier> {
        self.barriers.get(name).cloned()
    }

    /// Returns the frame processor.
    pub fn frame_processor(&self) -> &FrameProcessor<F> {
        &self.frame_processor
    }

    /// Returns the frame processor for adding injectors.
    pub fn frame_processor_mut(&mut self) -> &mut FrameProcessor<F> {
        &mut self.frame_processor
    }
}

impl<F> fmt::Debug for SystemContext<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemContext")
            .field("services", &self.services)
            .field("update_groups", &self.update_groups.len())
            .field("render_groups", &self.render_groups.len())
            .field("barriers", &self.barriers.len())
            .finish()
    }
}

/// Owns the systems of one runtime and drives their lifecycle and frames.
pub struct SystemCollection<F> {
    systems: Vec<Box<dyn System<F>>>,
    index: AHashMap<TypeId, usize>,
    context: SystemContext<F>,
    initialized: bool,
}

impl<F: Send + Sync + 'static> SystemCollection<F> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            index: AHashMap::new(),
            context: SystemContext::new(),
            initialized: false,
        }
    }

    /// Adds a system and runs its `on_added_to` hook.
    ///
    /// At most one system of each type can be added.
    pub fn add<S: System<F>>(&mut self, mut system: S) -> Result<(), SystemError> {
        let id = TypeId::of::<S>();
        if self.index.contains_key(&id) {
            return Err(SystemError::DuplicateSystem(type_name::<S>()));
        }
        system.on_added_to(&mut self.context);
        log::info!("System '{}' added.", system.name());
        self.index.insert(id, self.systems.len());
        self.systems.push(Box::new(system));
        Ok(())
    }

    /// Returns the system of type `S`.
    pub fn get<S: System<F>>(&self) -> Option<&S> {
        let index = *self.index.get(&TypeId::of::<S>())?;
        let system = &*self.systems[index];
        system.as_any().downcast_ref::<S>()
    }

    /// Returns the system of type `S` mutably.
    pub fn get_mut<S: System<F>>(&mut self) -> Option<&mut S> {
        let index = *self.index.get(&TypeId::of::<S>())?;
        let system = &mut *self.systems[index];
        system.as_any_mut().downcast_mut::<S>()
    }

    /// Returns the names of the systems in the order they were added.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|system| system.name())
    }

    /// Returns the number of systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no system was added.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Returns the shared context.
    pub fn context(&self) -> &SystemContext<F> {
        &self.context
    }

    /// Returns the shared context mutably.
    pub fn context_mut(&mut self) -> &mut SystemContext<F> {
        &mut self.context
    }

    /// Publishes an interface. See [`SystemContext::register_interface`].
    pub fn register_interface<I: ?Sized + Send + Sync + 'static>(&mut self, interface: Arc<I>) {
        self.context.register_interface(interface);
    }

    /// Looks up a published interface.
    pub fn query_interface<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        self.context.query_interface::<I>()
    }

    /// Publishes the cache that serves resources of type `T`.
    pub fn add_cache_interface<T: Asset>(&mut self, cache: Arc<dyn ResourceProvider<T>>) {
        self.context.add_cache_interface(cache);
    }

    /// Returns the cache serving resources of type `T`.
    pub fn get_cache<T: Asset>(&self) -> Option<Arc<dyn ResourceProvider<T>>> {
        self.context.get_cache::<T>()
    }

    /// Loads a `T` through its cache, blocking until it is ready.
    pub fn load<T: Asset>(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<T>, SystemError> {
        self.context.load(params, queue)
    }

    /// Starts loading a `T` and returns its not-yet-ready handle.
    pub fn load_async<T: Asset>(
        &self,
        params: &LoadParams,
        queue: &TaskQueue,
    ) -> Result<ResourceHandle<T>, SystemError> {
        self.context.load_async(params, queue)
    }

    /// Returns the barrier published under `name`.
    pub fn barrier(&self, name: &str) -> Option<TaskBarrier> {
        self.context.barrier(name)
    }

    /// Returns the update group named `name`, if it exists.
    pub fn update_group(&self, name: &str) -> Option<ParameterizedTaskGroup<UpdateParams<F>>> {
        self.context.update_group(name)
    }

    /// Returns the render group named `name`, if it exists.
    pub fn render_group(&self, name: &str) -> Option<ParameterizedTaskGroup<RenderParams<F>>> {
        self.context.render_group(name)
    }

    /// Returns the frame processor.
    pub fn frame_processor(&self) -> &FrameProcessor<F> {
        &self.context.frame_processor
    }

    /// Returns `true` once `startup` succeeded and every system reports
    /// itself initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized && self.systems.iter().all(|system| system.is_initialized())
    }

    /// Starts every system in order of addition and waits until all of them
    /// are ready, running queued work meanwhile.
    pub fn startup(&mut self, queue: &TaskQueue) -> Result<(), SystemError> {
        if self.initialized {
            log::warn!("System collection started twice; ignoring.");
            return Ok(());
        }
        let mut pending = Vec::new();
        for system in &mut self.systems {
            log::info!("Starting system '{}'.", system.name());
            if let Some(ready) = system.startup(&mut self.context, queue)? {
                pending.push((system.name().to_owned(), ready));
            }
        }

        let all_ready = TaskBarrier::all(pending.iter().map(|(_, ready)| ready));
        let _ = queue.yield_until_finished(&all_ready);
        for (system, ready) in pending {
            if let Some(Err(source)) = ready.outcome() {
                log::error!("System '{system}' failed to start: {source}");
                return Err(SystemError::Startup { system, source });
            }
        }

        self.initialized = true;
        log::info!("{} systems started.", self.systems.len());
        Ok(())
    }

    /// Makes `frame` the active frame: notifies every system, then schedules
    /// the frame's injection. Returns the injection barrier.
    pub fn set_frame(&mut self, frame: Arc<F>, queue: &TaskQueue) -> TaskBarrier {
        for system in &mut self.systems {
            system.new_frame(&frame);
        }
        self.context.frame_processor.set_frame(frame, queue)
    }

    /// Schedules an update and a render of the active frame.
    pub fn run_frame(&mut self, time: FrameTime, queue: &TaskQueue) -> Result<(), SystemError> {
        self.context.frame_processor.apply(time, queue, true, true)
    }

    /// Schedules an update of the active frame.
    pub fn update_frame(&mut self, time: FrameTime, queue: &TaskQueue) -> Result<(), SystemError> {
        self.context.frame_processor.apply(time, queue, true, false)
    }

    /// Schedules a render of the active frame.
    pub fn render_frame(&mut self, time: FrameTime, queue: &TaskQueue) -> Result<(), SystemError> {
        self.context.frame_processor.apply(time, queue, false, true)
    }

    /// Waits for the latest update.
    pub fn wait_on_update(&self, queue: &TaskQueue) -> Result<(), SystemError> {
        Ok(self.context.frame_processor.wait_on_update(queue)?)
    }

    /// Waits for the latest render.
    pub fn wait_on_render(&self, queue: &TaskQueue) -> Result<(), SystemError> {
        Ok(self.context.frame_processor.wait_on_render(queue)?)
    }

    /// Waits for all work of the active frame.
    pub fn wait_until_finished(&self, queue: &TaskQueue) -> Result<(), SystemError> {
        Ok(self.context.frame_processor.wait_until_finished(queue)?)
    }

    /// Drains frame work, then shuts the systems down in reverse order.
    pub fn shutdown(&mut self, queue: &TaskQueue) {
        self.context.frame_processor.reset(queue);
        for system in self.systems.iter_mut().rev() {
            log::info!("Shutting down system '{}'.", system.name());
            system.shutdown();
        }
        self.initialized = false;
    }
}

impl<F: Send + Sync + 'static> Default for SystemCollection<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Send + Sync + 'static> fmt::Debug for SystemCollection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCollection")
            .field(
                "systems",
                &self.systems.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("initialized", &self.initialized)
            .field("context", &self.context)
            .finish()
    }
}
