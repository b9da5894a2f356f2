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

//! Drives the inject, update and render groups of each frame.
//!
//! Every frame goes through up to three groups:
//!
//! 1. **Inject** runs once per newly set frame. Injection procedures are
//!    grouped by the type they fill in; one task per target type runs its
//!    procedures in order.
//! 2. **Update** waits for the injection and publishes its barrier as the
//!    update switch.
//! 3. **Render** waits for the injection and for the *previous* update, and
//!    renders with the parameters that update saved. Its barrier is the
//!    render switch.
//!
//! Update and render of the same `apply` may run at the same time; the
//! processor does no double buffering of its own. Ordering gates only wait
//! for completion, so one failed frame never blocks the following ones.

use crate::error::SystemError;
use crate::group::{ParameterizedTask, ParameterizedTaskGroup};
use crate::time::FrameTime;
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;
use weft_core::{TaskBarrier, TaskQueue, TaskResult};

/// Parameters shared by every update task of one frame.
pub struct UpdateParams<F> {
    /// Timing of this update.
    pub time: FrameTime,
    /// The frame being updated.
    pub frame: Arc<F>,
}

/// Parameters shared by every render task of one frame.
pub struct RenderParams<F> {
    /// Timing of the update that produced the rendered state.
    pub time: FrameTime,
    /// The frame being rendered.
    pub frame: Arc<F>,
}

impl<F> Clone for UpdateParams<F> {
    fn clone(&self) -> Self {
        Self {
            time: self.time,
            frame: self.frame.clone(),
        }
    }
}

impl<F> Clone for RenderParams<F> {
    fn clone(&self) -> Self {
        Self {
            time: self.time,
            frame: self.frame.clone(),
        }
    }
}

impl<F> From<&UpdateParams<F>> for RenderParams<F> {
    fn from(params: &UpdateParams<F>) -> Self {
        Self {
            time: params.time,
            frame: params.frame.clone(),
        }
    }
}

type InjectFn<F> = dyn Fn(&F) -> anyhow::Result<()> + Send + Sync;

/// A procedure that fills part of a newly set frame.
pub struct InjectProc<F> {
    target: TypeId,
    target_name: &'static str,
    procedure: Arc<InjectFn<F>>,
}

impl<F: Send + Sync + 'static> InjectProc<F> {
    /// Creates a procedure that fills the data of type `T` in the frame.
    pub fn new<T, P>(procedure: P) -> Self
    where
        T: 'static,
        P: Fn(&F) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            target: TypeId::of::<T>(),
            target_name: type_name::<T>(),
            procedure: Arc::new(procedure),
        }
    }

    /// Returns the type this procedure fills.
    pub fn target(&self) -> TypeId {
        self.target
    }
}

/// Every injection procedure of one target type.
pub struct TypeInjector<F> {
    target: TypeId,
    target_name: &'static str,
    procedures: Vec<Arc<InjectFn<F>>>,
}

impl<F: Send + Sync + 'static> TypeInjector<F> {
    fn new(target: TypeId, target_name: &'static str) -> Self {
        Self {
            target,
            target_name,
            procedures: Vec::new(),
        }
    }

    /// Returns the name of the target type.
    pub fn target_name(&self) -> &'static str {
        self.target_name
    }

    /// Returns the number of procedures for this type.
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    /// Returns `true` if no procedure targets this type.
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    fn task(&self) -> ParameterizedTask<Arc<F>> {
        let procedures = self.procedures.clone();
        ParameterizedTask::new(
            format!("inject {}", self.target_name),
            move |frame: &Arc<F>, _| {
                procedures
                    .iter()
                    .try_for_each(|procedure| procedure(&**frame))
            },
        )
    }
}

/// Runs the per-frame inject, update and render groups.
///
/// `apply` only schedules work; wait with
/// [`wait_on_update`](FrameProcessor::wait_on_update),
/// [`wait_on_render`](FrameProcessor::wait_on_render) or
/// [`wait_until_finished`](FrameProcessor::wait_until_finished).
pub struct FrameProcessor<F> {
    inject: ParameterizedTaskGroup<Arc<F>>,
    update: ParameterizedTaskGroup<UpdateParams<F>>,
    render: ParameterizedTaskGroup<RenderParams<F>>,
    injectors: Vec<TypeInjector<F>>,
    inject_switch: TaskBarrier,
    update_switch: TaskBarrier,
    render_switch: TaskBarrier,
    frame: Option<Arc<F>>,
    saved_render_params: Option<RenderParams<F>>,
    first_frame: bool,
    inject_pending: bool,
}

impl<F: Send + Sync + 'static> FrameProcessor<F> {
    /// Creates a processor with empty groups and no frame.
    pub fn new() -> Self {
        Self {
            inject: ParameterizedTaskGroup::new("inject"),
            update: ParameterizedTaskGroup::new("update"),
            render: ParameterizedTaskGroup::new("render"),
            injectors: Vec::new(),
            inject_switch: TaskBarrier::signaled(),
            update_switch: TaskBarrier::signaled(),
            render_switch: TaskBarrier::signaled(),
            frame: None,
            saved_render_params: None,
            first_frame: true,
            inject_pending: false,
        }
    }

    /// Adds an injection procedure.
    ///
    /// If a frame is already set, the procedure runs on the next `apply` or
    /// `flush`.
    pub fn add_injector(&mut self, procedure: InjectProc<F>) {
        let index = match self
            .injectors
            .iter()
            .position(|injector| injector.target == procedure.target)
        {
            Some(index) => index,
            None => {
                self.injectors
                    .push(TypeInjector::new(procedure.target, procedure.target_name));
                self.injectors.len() - 1
            }
        };
        self.injectors[index].procedures.push(procedure.procedure);
        self.inject.replace(self.injectors[index].task());
        self.inject_pending = self.frame.is_some();
    }

    /// Returns the injectors, one per target type.
    pub fn injectors(&self) -> &[TypeInjector<F>] {
        &self.injectors
    }

    /// Appends a task to the update group.
    pub fn add_update_task(&self, task: ParameterizedTask<UpdateParams<F>>) {
        self.update.add(task);
    }

    /// Appends a task to the render group.
    pub fn add_render_task(&self, task: ParameterizedTask<RenderParams<F>>) {
        self.render.add(task);
    }

    /// Nests a group into the update group.
    pub fn add_update_group(&self, group: &ParameterizedTaskGroup<UpdateParams<F>>) {
        self.update.add_group(group);
    }

    /// Nests a group into the render group.
    pub fn add_render_group(&self, group: &ParameterizedTaskGroup<RenderParams<F>>) {
        self.render.add_group(group);
    }

    /// The group run once per newly set frame.
    pub fn inject_group(&self) -> &ParameterizedTaskGroup<Arc<F>> {
        &self.inject
    }

    /// The group run on every update.
    pub fn update_group(&self) -> &ParameterizedTaskGroup<UpdateParams<F>> {
        &self.update
    }

    /// The group run on every render.
    pub fn render_group(&self) -> &ParameterizedTaskGroup<RenderParams<F>> {
        &self.render
    }

    /// Returns the active frame.
    pub fn frame(&self) -> Option<&Arc<F>> {
        self.frame.as_ref()
    }

    /// Returns `true` until the first `apply` after a frame is set.
    pub fn is_first_frame(&self) -> bool {
        self.first_frame
    }

    /// Barrier of the latest injection.
    pub fn inject_barrier(&self) -> &TaskBarrier {
        &self.inject_switch
    }

    /// Barrier of the latest update.
    pub fn update_switch(&self) -> &TaskBarrier {
        &self.update_switch
    }

    /// Barrier of the latest render.
    pub fn render_switch(&self) -> &TaskBarrier {
        &self.render_switch
    }

    /// Makes `frame` the active frame and schedules its injection.
    ///
    /// Returns the injection barrier. Update and render work already in
    /// flight keeps the frame it started with.
    pub fn set_frame(&mut self, frame: Arc<F>, queue: &TaskQueue) -> TaskBarrier {
        self.inject_switch = self.inject.apply(frame.clone(), queue);
        self.frame = Some(frame);
        self.saved_render_params = None;
        self.first_frame = true;
        self.inject_pending = false;
        log::debug!(
            "New frame set; injecting {} target types.",
            self.injectors.len()
        );
        self.inject_switch.clone()
    }

    /// Schedules one update and/or render of the active frame.
    pub fn apply(
        &mut self,
        time: FrameTime,
        queue: &TaskQueue,
        do_update: bool,
        do_render: bool,
    ) -> Result<(), SystemError> {
        let frame = self.frame.clone().ok_or(SystemError::NoFrame)?;
        if self.inject_pending {
            self.inject_switch = self.inject.apply(frame.clone(), queue);
            self.inject_pending = false;
        }
        let injected = self.inject_switch.settled();
        let params = UpdateParams { time, frame };

        if do_render {
            let render_params = match &self.saved_render_params {
                Some(saved) if !self.first_frame => saved.clone(),
                _ => RenderParams::from(&params),
            };
            let previous_update = self.update_switch.settled();
            self.render_switch =
                self.render
                    .apply_after(render_params, queue, [&injected, &previous_update]);
            log::trace!("Render scheduled behind {}.", self.update_switch.id());
        }
        if do_update {
            self.saved_render_params = Some(RenderParams::from(&params));
            self.update_switch = self.update.apply_after(params, queue, [&injected]);
            log::trace!("Update scheduled at t = {:.3}s.", time.current_time);
        }
        self.first_frame = false;
        Ok(())
    }

    /// Waits for the latest update, running queued work meanwhile.
    pub fn wait_on_update(&self, queue: &TaskQueue) -> TaskResult<()> {
        queue.yield_until_finished(&self.update_switch)
    }

    /// Waits for the latest render, running queued work meanwhile.
    pub fn wait_on_render(&self, queue: &TaskQueue) -> TaskResult<()> {
        queue.yield_until_finished(&self.render_switch)
    }

    /// Waits for injection, update and render. Reports the first failure
    /// after all three have finished.
    pub fn wait_until_finished(&self, queue: &TaskQueue) -> TaskResult<()> {
        let inject = queue.yield_until_finished(&self.inject_switch);
        let update = self.wait_on_update(queue);
        let render = self.wait_on_render(queue);
        inject.and(update).and(render)
    }

    /// Runs any pending injection and waits for every in-flight group.
    pub fn flush(&mut self, queue: &TaskQueue) -> TaskResult<()> {
        if self.inject_pending {
            if let Some(frame) = self.frame.clone() {
                self.inject_switch = self.inject.apply(frame, queue);
            }
            self.inject_pending = false;
        }
        self.wait_until_finished(queue)
    }

    /// Waits for in-flight work, then returns to the no-frame state.
    pub fn reset(&mut self, queue: &TaskQueue) {
        if let Err(err) = self.wait_until_finished(queue) {
            log::warn!("Frame work failed before reset: {err}");
        }
        self.frame = None;
        self.saved_render_params = None;
        self.first_frame = true;
        self.inject_pending = false;
        self.inject_switch = TaskBarrier::signaled();
        self.update_switch = TaskBarrier::signaled();
        self.render_switch = TaskBarrier::signaled();
    }
}

impl<F: Send + Sync + 'static> Default for FrameProcessor<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for FrameProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProcessor")
            .field("has_frame", &self.frame.is_some())
            .field("first_frame", &self.first_frame)
            .field("injectors", &self.injectors.len())
            .field("update_switch", &self.update_switch)
            .field("render_switch", &self.render_switch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use weft_core::{PoolConfig, ThreadPool};

    #[derive(Default)]
    struct Scene {
        transforms_ready: AtomicBool,
        lights: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    struct Transforms;
    struct Lights;

    fn at(seconds: f64) -> FrameTime {
        FrameTime {
            current_time: seconds,
            elapsed_time: 1.0,
        }
    }

    fn pool(workers: usize) -> ThreadPool {
        ThreadPool::start(PoolConfig::default().with_workers(workers).with_io_threads(0)).unwrap()
    }

    #[test]
    fn inject_completes_before_update_and_render() {
        let pool = pool(2);
        let queue = pool.queue();
        let mut processor = FrameProcessor::<Scene>::new();
        processor.add_injector(InjectProc::new::<Transforms, _>(|scene: &Scene| {
            thread::sleep(Duration::from_millis(20));
            scene.transforms_ready.store(true, Ordering::SeqCst);
            Ok(())
        }));
        processor.add_update_task(ParameterizedTask::new(
            "physics",
            |params: &UpdateParams<Scene>, _| {
                let ready = params.frame.transforms_ready.load(Ordering::SeqCst);
                params.frame.log.lock().push(format!("update {ready}"));
                Ok(())
            },
        ));
        processor.add_render_task(ParameterizedTask::new(
            "draw",
            |params: &RenderParams<Scene>, _| {
                let ready = params.frame.transforms_ready.load(Ordering::SeqCst);
                params.frame.log.lock().push(format!("render {ready}"));
                Ok(())
            },
        ));

        let scene = Arc::new(Scene::default());
        processor.set_frame(scene.clone(), queue);
        processor.apply(at(0.0), queue, true, true).unwrap();
        processor.wait_until_finished(queue).unwrap();

        let mut log = scene.log.lock().clone();
        log.sort();
        assert_eq!(log, vec!["render true", "update true"]);
    }

    #[test]
    fn render_uses_the_previous_update_parameters() {
        let pool = pool(1);
        let queue = pool.queue();
        let mut processor = FrameProcessor::<Scene>::new();
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = rendered.clone();
        processor.add_render_task(ParameterizedTask::new(
            "capture",
            move |params: &RenderParams<Scene>, _| {
                sink.lock().push(params.time.current_time);
                Ok(())
            },
        ));

        processor.set_frame(Arc::new(Scene::default()), queue);
        assert!(processor.is_first_frame());
        for t in [1.0, 2.0, 3.0] {
            processor.apply(at(t), queue, true, true).unwrap();
        }
        processor.wait_until_finished(queue).unwrap();
        assert!(!processor.is_first_frame());
        assert_eq!(*rendered.lock(), vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn render_waits_for_the_previous_update() {
        let pool = pool(2);
        let queue = pool.queue();
        let mut processor = FrameProcessor::<Scene>::new();
        processor.add_update_task(ParameterizedTask::new(
            "slow update",
            |params: &UpdateParams<Scene>, _| {
                thread::sleep(Duration::from_millis(15));
                let n = params.time.current_time;
                params.frame.log.lock().push(format!("update {n}"));
                Ok(())
            },
        ));
        processor.add_render_task(ParameterizedTask::new(
            "render",
            |params: &RenderParams<Scene>, _| {
                let n = params.time.current_time;
                params.frame.log.lock().push(format!("render {n}"));
                Ok(())
            },
        ));

        let scene = Arc::new(Scene::default());
        processor.set_frame(scene.clone(), queue);
        processor.apply(at(1.0), queue, true, true).unwrap();
        processor.apply(at(2.0), queue, true, true).unwrap();
        processor.wait_until_finished(queue).unwrap();

        let log = scene.log.lock().clone();
        let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        // The second render draws the state of the first update.
        assert_eq!(log.iter().filter(|e| *e == "render 1").count(), 2);
        assert!(position("update 1") < log.iter().rposition(|e| e == "render 1").unwrap());
        assert!(position("update 1") < position("update 2"));
    }

    #[test]
    fn apply_without_a_frame_is_rejected() {
        let pool = pool(0);
        let mut processor = FrameProcessor::<Scene>::new();
        assert!(matches!(
            processor.apply(at(0.0), pool.queue(), true, true),
            Err(SystemError::NoFrame)
        ));
    }

    #[test]
    fn injectors_are_grouped_by_target_type() {
        let mut processor = FrameProcessor::<Scene>::new();
        for _ in 0..2 {
            processor.add_injector(InjectProc::new::<Lights, _>(|scene: &Scene| {
                scene.lights.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        processor.add_injector(InjectProc::new::<Transforms, _>(|_: &Scene| Ok(())));

        assert_eq!(processor.injectors().len(), 2);
        assert_eq!(processor.injectors()[0].len(), 2);
        assert!(processor.injectors()[0].target_name().ends_with("Lights"));
        assert_eq!(processor.inject_group().len(), 2);
    }

    #[test]
    fn adding_injectors_keeps_groups_nested_in_inject() {
        let pool = pool(0);
        let queue = pool.queue();
        let mut processor = FrameProcessor::<Scene>::new();
        let streaming = ParameterizedTaskGroup::new("streaming");
        streaming.add_fn("count", |scene: &Arc<Scene>, _| {
            scene.lights.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });
        processor.inject_group().add_group(&streaming);
        processor.add_injector(InjectProc::new::<Lights, _>(|scene: &Scene| {
            scene.lights.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(processor.inject_group().group_count(), 1);

        let scene = Arc::new(Scene::default());
        let injected = processor.set_frame(scene.clone(), queue);
        queue.yield_until_finished(&injected).unwrap();
        assert_eq!(scene.lights.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn flush_runs_injectors_added_after_set_frame() {
        let pool = pool(0);
        let queue = pool.queue();
        let mut processor = FrameProcessor::<Scene>::new();
        let scene = Arc::new(Scene::default());
        processor.set_frame(scene.clone(), queue);
        processor.add_injector(InjectProc::new::<Lights, _>(|scene: &Scene| {
            scene.lights.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        processor.flush(queue).unwrap();
        assert_eq!(scene.lights.load(Ordering::SeqCst), 1);

        processor.reset(queue);
        assert!(processor.frame().is_none());
        assert!(processor.is_first_frame());
        assert!(processor.update_switch().is_signaled());
    }

    #[test]
    fn a_failed_update_does_not_block_later_frames() {
        let pool = pool(1);
        let queue = pool.queue();
        let mut processor = FrameProcessor::<Scene>::new();
        processor.add_update_task(ParameterizedTask::new(
            "flaky",
            |params: &UpdateParams<Scene>, _| {
                anyhow::ensure!(params.time.current_time > 1.0, "too early");
                Ok(())
            },
        ));
        processor.set_frame(Arc::new(Scene::default()), queue);

        processor.apply(at(1.0), queue, true, true).unwrap();
        assert!(processor.wait_on_update(queue).is_err());
        processor.apply(at(2.0), queue, true, true).unwrap();
        assert!(processor.wait_until_finished(queue).is_ok());
    }
}
