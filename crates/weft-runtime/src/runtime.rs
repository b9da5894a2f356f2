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

//! The runtime context: one thread pool, one system collection and the
//! telemetry that watches them.
//!
//! There is no global instance. The entry point builds a [`Runtime`] on its
//! main thread and passes it by reference.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use std::sync::Arc;
use weft_assets::{ResourceCache, ResourceLoader};
use weft_core::telemetry::MetricId;
use weft_core::{AsBarrier, TaskBarrier, TaskQueue, ThreadPool};
use weft_systems::{FrameClock, FrameTime, System, SystemCollection};
use weft_telemetry::{init_logging, CounterHandle, GaugeHandle, TelemetryService};

/// Owns the pool, the systems of frames `F` and the telemetry service.
pub struct Runtime<F: Send + Sync + 'static> {
    pool: ThreadPool,
    systems: SystemCollection<F>,
    telemetry: TelemetryService,
    clock: FrameClock,
    time: FrameTime,
    frames: u64,
    frames_run: CounterHandle,
    frame_seconds: GaugeHandle,
    running: bool,
}

impl<F: Send + Sync + 'static> Runtime<F> {
    /// Installs the logger and starts the pool.
    ///
    /// The calling thread becomes the pool's main thread: main-thread tasks
    /// only run on it.
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        init_logging(&config.logging);
        let pool = ThreadPool::start(config.pool.clone()).map_err(RuntimeError::Pool)?;
        let mut telemetry = TelemetryService::new(config.telemetry.clone());
        telemetry.register(Arc::new(pool.queue().clone()));
        let metrics = telemetry.metrics_registry();
        let frames_run = metrics.register_counter(MetricId::new("runtime", "frames"), "Frames run");
        let frame_seconds = metrics.register_gauge(
            MetricId::new("runtime", "frame_seconds"),
            "Time between the last two frames",
        );
        Ok(Self {
            pool,
            systems: SystemCollection::new(),
            telemetry,
            clock: FrameClock::new(),
            time: FrameTime::default(),
            frames: 0,
            frames_run,
            frame_seconds,
            running: true,
        })
    }

    /// Returns the task queue.
    pub fn queue(&self) -> &TaskQueue {
        self.pool.queue()
    }

    /// Returns the system collection.
    pub fn systems(&self) -> &SystemCollection<F> {
        &self.systems
    }

    /// Returns the system collection mutably.
    pub fn systems_mut(&mut self) -> &mut SystemCollection<F> {
        &mut self.systems
    }

    /// Returns the telemetry service.
    pub fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    /// Adds a system. See [`SystemCollection::add`].
    pub fn add_system<S: System<F>>(&mut self, system: S) -> Result<(), RuntimeError> {
        Ok(self.systems.add(system)?)
    }

    /// Publishes `cache` to the systems and samples its statistics.
    pub fn add_cache<L: ResourceLoader>(&mut self, cache: ResourceCache<L>) {
        self.telemetry.register(cache.stat_source());
        self.systems.context_mut().add_cache(cache);
    }

    /// Starts every system and waits until they are ready.
    pub fn startup(&mut self) -> Result<(), RuntimeError> {
        let queue = self.pool.queue();
        self.systems.startup(queue)?;
        self.clock.restart();
        self.time = FrameTime::default();
        Ok(())
    }

    /// Waits for `target`, running queued work, including main-thread work,
    /// meanwhile. Used for loading screens.
    pub fn wait_for(&self, target: &impl AsBarrier) -> Result<(), RuntimeError> {
        Ok(self.pool.queue().yield_until_finished(target)?)
    }

    /// Makes `frame` active. Returns its injection barrier.
    pub fn set_frame(&mut self, frame: Arc<F>) -> TaskBarrier {
        let queue = self.pool.queue();
        self.systems.set_frame(frame, queue)
    }

    /// Schedules the next frame, runs pending main-thread work and samples
    /// telemetry when due. Returns the frame's time.
    pub fn run_frame(&mut self) -> Result<FrameTime, RuntimeError> {
        self.time.update_from(&self.clock);
        let queue = self.pool.queue();
        self.systems.run_frame(self.time, queue)?;
        self.pool.process_main_thread_tasks();
        self.frames += 1;
        let recorded = self
            .frames_run
            .increment()
            .and_then(|_| self.frame_seconds.set(self.time.elapsed_time));
        if let Err(err) = recorded {
            log::warn!("Frame metrics not recorded: {err}");
        }
        self.telemetry.tick();
        Ok(self.time)
    }

    /// Waits for the latest frame's update and render.
    pub fn wait_until_finished(&self) -> Result<(), RuntimeError> {
        Ok(self.systems.wait_until_finished(self.pool.queue())?)
    }

    /// Returns the number of frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Drains frame work, shuts the systems down, then stops the pool.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.systems.shutdown(self.pool.queue());
        self.telemetry.sample_now();
        log::info!("Runtime stopped after {} frames.", self.frames);
        self.pool.shutdown();
    }
}

impl<F: Send + Sync + 'static> Drop for Runtime<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
