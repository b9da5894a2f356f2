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

//! The thread pool and its task queue.
//!
//! A [`ThreadPool`] owns the CPU workers and the blocking-I/O workers; the
//! thread that calls [`ThreadPool::startup`] becomes the main thread. All
//! scheduling goes through a [`TaskQueue`], a cheap cloneable handle that
//! task bodies also receive through [`TaskParams`].
//!
//! Tasks move through three stages:
//!
//! 1. *made*: [`TaskQueue::make`] registers the task; dependencies can be
//!    declared with [`TaskQueue::dependencies`].
//! 2. *scheduled*: [`TaskQueue::schedule`] releases the task. It waits until
//!    every declared dependency has signaled.
//! 3. *ready*: the task sits in the ready queue of its [`TaskKind`] until a
//!    thread of that class picks it up.
//!
//! ```
//! use weft_core::config::PoolConfig;
//! use weft_core::pool::ThreadPool;
//! use weft_core::task::TaskKind;
//!
//! let mut pool = ThreadPool::new(PoolConfig::default().with_workers(2).with_io_threads(1));
//! pool.startup().unwrap();
//!
//! let read = pool.queue().spawn(TaskKind::FileIo, |_| Ok(vec![1u8, 2, 3]));
//! let total = read.map(|bytes| bytes.iter().map(|b| u32::from(*b)).sum::<u32>());
//! pool.queue().yield_until_finished(&total).unwrap();
//! assert_eq!(*total.get().unwrap(), 6);
//! pool.shutdown();
//! ```

mod queue;
mod stats;
mod worker;

pub use stats::{PoolStats, PoolStatsSnapshot};

use crate::barrier::{AsBarrier, BarrierLock, TaskBarrier, WeakBarrier};
use crate::config::PoolConfig;
use crate::error::{TaskError, TaskResult};
use crate::future::{channel, Future};
use crate::task::{describe, Task, TaskDesc, TaskId, TaskKind, TaskParams, ThreadRole};
use crate::telemetry::{MetricId, MetricValue, StatSource};
use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use queue::ReadyQueue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_SHUT_DOWN: u8 = 2;

/// Output table size below which dropped entries are not swept.
const OUTPUTS_MIN_SWEEP: usize = 256;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A made task that has not been scheduled yet.
struct Pending {
    task: Task,
    /// Holds one count for the `schedule` call plus one per dependency.
    gate: TaskBarrier,
}

/// Weak handles to the output barrier of every task made by a queue.
///
/// Entries outlive the task, so a dependency declared on a finished task
/// still sees its outcome while anyone holds the barrier.
struct Outputs {
    barriers: AHashMap<TaskId, WeakBarrier>,
    sweep_at: usize,
}

impl Outputs {
    fn insert(&mut self, id: TaskId, output: &TaskBarrier) {
        if self.barriers.len() >= self.sweep_at {
            self.barriers.retain(|_, barrier| !barrier.is_dropped());
            self.sweep_at = (self.barriers.len() * 2).max(OUTPUTS_MIN_SWEEP);
        }
        self.barriers.insert(id, output.downgrade());
    }

    fn get(&mut self, id: TaskId) -> Option<TaskBarrier> {
        let output = self.barriers.get(&id)?.upgrade();
        if output.is_none() {
            self.barriers.remove(&id);
        }
        output
    }
}

pub(crate) struct Shared {
    id: u64,
    pub(crate) config: PoolConfig,
    state: AtomicU8,
    generic: ReadyQueue,
    io: ReadyQueue,
    /// Taken at shutdown; main-thread tasks admitted afterwards are cancelled.
    main_tx: Mutex<Option<Sender<Task>>>,
    main_rx: Receiver<Task>,
    pending: Mutex<AHashMap<TaskId, Pending>>,
    outputs: Mutex<Outputs>,
    next_task: AtomicU64,
    in_flight: Mutex<usize>,
    idle: Condvar,
    stats: PoolStats,
}

impl Shared {
    pub(crate) fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    fn is_shut_down(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_SHUT_DOWN
    }

    fn routes_io_to_generic(&self) -> bool {
        self.config.io_threads == 0
    }

    pub(crate) fn ready_queue_for(&self, role: ThreadRole) -> &ReadyQueue {
        match role {
            ThreadRole::Io(_) => &self.io,
            _ => &self.generic,
        }
    }

    /// Moves a scheduled task whose gate just signaled into its ready queue.
    fn admit(&self, task: Task, gate_outcome: &TaskResult<()>) {
        if let Err(cause) = gate_outcome {
            log::debug!("Skipping {}: a dependency failed ({cause}).", task.label());
            PoolStats::bump(&self.stats.skipped);
            self.finish(&task.output, Err(cause.clone().into_dependency_failure()));
            return;
        }
        if self.is_shut_down() {
            self.cancel(task);
            return;
        }

        // Queues close under their own lock at shutdown, so a task admitted
        // concurrently is either drained by `shutdown` or handed back here.
        let rejected = match task.kind {
            TaskKind::MainThread => match self.main_tx.lock().as_ref() {
                Some(tx) => tx.send(task).map_err(|err| err.into_inner()),
                None => Err(task),
            },
            TaskKind::FileIo if !self.routes_io_to_generic() => self.io.push(task),
            TaskKind::FileIo | TaskKind::Generic => self.generic.push(task),
        };
        if let Err(task) = rejected {
            self.cancel(task);
        }
    }

    /// Drops a task without running it.
    pub(crate) fn cancel(&self, task: Task) {
        log::debug!("Cancelling {}: pool shut down.", task.label());
        PoolStats::bump(&self.stats.cancelled);
        self.finish(&task.output, Err(TaskError::PoolShutDown));
    }

    fn finish(&self, output: &TaskBarrier, outcome: TaskResult<()>) {
        output.complete_with(outcome);

        let mut in_flight = self.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

/// Builder returned by [`TaskQueue::dependencies`].
#[must_use = "dependencies are declared by chaining `after` calls"]
pub struct Dependencies<'a> {
    queue: &'a TaskQueue,
    task: TaskId,
    gate: TaskBarrier,
}

impl Dependencies<'_> {
    /// Keeps the task from becoming ready until `barrier` signals.
    ///
    /// If `barrier` signals with a failure, the task body never runs and its
    /// output barrier fails with [`TaskError::DependencyFailed`].
    pub fn after(self, barrier: &impl AsBarrier) -> Self {
        let _ = BarrierLock::on(&self.gate).connect(barrier).finish();
        self
    }

    /// Keeps the task from becoming ready until another task finishes.
    ///
    /// A task that already finished is depended on through its recorded
    /// outcome: if it failed, this task is skipped. Once its output barrier
    /// has been dropped everywhere the outcome is gone and it imposes no wait.
    ///
    /// # Panics
    ///
    /// Panics if `other` was never made by this queue.
    pub fn after_task(self, other: TaskId) -> Self {
        assert!(
            self.queue.made(other),
            "{other} was never made by this queue"
        );
        match self.queue.output_of(other) {
            Some(output) => self.after(&output),
            None => self,
        }
    }

    /// Adds every barrier in `barriers` as a dependency.
    pub fn after_all<'b, B>(self, barriers: impl IntoIterator<Item = &'b B>) -> Self
    where
        B: AsBarrier + 'b,
    {
        barriers
            .into_iter()
            .fold(self, |deps, barrier| deps.after(barrier))
    }

    /// Returns the task these dependencies apply to.
    pub fn task(&self) -> TaskId {
        self.task
    }
}

/// A cloneable handle for creating, scheduling and waiting on tasks.
#[derive(Clone)]
pub struct TaskQueue {
    pub(crate) shared: Arc<Shared>,
}

impl TaskQueue {
    fn new(config: PoolConfig) -> Self {
        let (main_tx, main_rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                config,
                state: AtomicU8::new(STATE_IDLE),
                generic: ReadyQueue::new(),
                io: ReadyQueue::new(),
                main_tx: Mutex::new(Some(main_tx)),
                main_rx,
                pending: Mutex::new(AHashMap::new()),
                outputs: Mutex::new(Outputs {
                    barriers: AHashMap::new(),
                    sweep_at: OUTPUTS_MIN_SWEEP,
                }),
                next_task: AtomicU64::new(1),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Registers a task without scheduling it. Returns its id and output barrier.
    fn register(&self, desc: TaskDesc) -> (TaskId, TaskBarrier) {
        let id = TaskId(self.shared.next_task.fetch_add(1, Ordering::Relaxed));
        let output = desc.output.unwrap_or_else(|| TaskBarrier::new(1));
        let task = Task {
            id,
            body: desc.body,
            kind: desc.kind,
            output: output.clone(),
            priority: desc.priority,
            name: desc.name,
        };
        self.shared.outputs.lock().insert(id, &output);
        self.shared.pending.lock().insert(
            id,
            Pending {
                task,
                gate: TaskBarrier::new(1),
            },
        );
        (id, output)
    }

    /// Registers a task described by `desc`. It will not run until scheduled.
    pub fn make(&self, desc: TaskDesc) -> TaskId {
        self.register(desc).0
    }

    /// Registers a generic task with an optional output barrier and a priority.
    pub fn make_task<F>(&self, body: F, output: Option<TaskBarrier>, priority: i32) -> TaskId
    where
        F: FnOnce(&TaskParams<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let mut desc = TaskDesc::new(body).priority(priority);
        desc.output = output;
        self.make(desc)
    }

    /// Returns the output barrier of a task made by this queue.
    ///
    /// Finished tasks are found for as long as their barrier is held
    /// somewhere; `None` otherwise.
    pub fn output_of(&self, task: TaskId) -> Option<TaskBarrier> {
        self.shared.outputs.lock().get(task)
    }

    fn made(&self, task: TaskId) -> bool {
        (1..self.shared.next_task.load(Ordering::Relaxed)).contains(&task.0)
    }

    /// Starts declaring dependencies for a made task.
    ///
    /// # Panics
    ///
    /// Panics if `task` was already scheduled or was never made by this queue.
    pub fn dependencies(&self, task: TaskId) -> Dependencies<'_> {
        let gate = match self.shared.pending.lock().get(&task) {
            Some(pending) => pending.gate.clone(),
            None => panic!("{task} is not awaiting scheduling; declare dependencies before `schedule`"),
        };
        Dependencies {
            queue: self,
            task,
            gate,
        }
    }

    /// Releases a made task. It becomes ready once all its dependencies have signaled.
    ///
    /// Scheduling on a pool that has shut down fails the task's output
    /// barrier with [`TaskError::PoolShutDown`].
    ///
    /// # Panics
    ///
    /// Panics if `task` was already scheduled or was never made by this queue.
    pub fn schedule(&self, id: TaskId) {
        let Some(Pending { task, gate }) = self.shared.pending.lock().remove(&id) else {
            if self.shared.is_shut_down() && self.made(id) {
                // Already failed by the shutdown that drained it.
                return;
            }
            panic!("{id} scheduled twice or never made");
        };
        PoolStats::bump(&self.shared.stats.scheduled);
        *self.shared.in_flight.lock() += 1;

        if self.shared.is_shut_down() {
            self.shared.cancel(task);
            return;
        }

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        gate.set_callback(move |outcome| match shared.upgrade() {
            Some(shared) => shared.admit(task, outcome),
            None => task.output.fail(TaskError::PoolShutDown),
        });
        gate.decrement();
    }

    /// Makes and schedules a task in one step. Returns its output barrier.
    pub fn submit(&self, desc: TaskDesc) -> TaskBarrier {
        let (id, output) = self.register(desc);
        self.schedule(id);
        output
    }

    /// Runs `body` as a task of `kind` and returns a future for its result.
    ///
    /// An error or panic in `body`, a shutdown before it runs, or a failed
    /// dependency all fail the future.
    pub fn spawn<T, F>(&self, kind: TaskKind, body: F) -> Future<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&TaskParams<'_>) -> anyhow::Result<T> + Send + 'static,
    {
        let (promise, future) = channel();
        let promise = Arc::new(promise);
        let producer = promise.clone();
        let output = self.submit(
            TaskDesc::new(move |params| {
                let value = body(params)?;
                producer.set(value);
                Ok(())
            })
            .kind(kind),
        );
        output.set_callback(move |outcome| {
            if let Err(error) = outcome {
                let _ = promise.try_fail(error.clone());
            }
        });
        future
    }

    /// Returns the role of the calling thread in this pool.
    pub fn current_role(&self) -> ThreadRole {
        worker::role_in(self.shared.id)
    }

    /// Returns `true` when called on the thread that started the pool.
    pub fn is_main_thread(&self) -> bool {
        self.current_role() == ThreadRole::Main
    }

    /// Runs one task the calling thread is allowed to run. Returns `false` if there was none.
    fn run_one(&self, role: ThreadRole) -> bool {
        let task = match role {
            ThreadRole::Main => self
                .shared
                .main_rx
                .try_recv()
                .ok()
                .or_else(|| self.shared.generic.try_pop()),
            ThreadRole::Worker(_) => self.shared.generic.try_pop(),
            ThreadRole::Io(_) => self.shared.io.try_pop(),
            ThreadRole::External => None,
        };
        match task {
            Some(task) => {
                self.run(task, role);
                true
            }
            None => false,
        }
    }

    pub(crate) fn run(&self, task: Task, role: ThreadRole) {
        let Task {
            id,
            body,
            output,
            name,
            ..
        } = task;
        let params = TaskParams { queue: self, role };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&params))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                log::warn!("{} failed: {error:#}", describe(id, name.as_deref()));
                Err(TaskError::failed(error))
            }
            Err(payload) => {
                let error = TaskError::from_panic(payload);
                log::error!("{} {error}", describe(id, name.as_deref()));
                Err(error)
            }
        };

        let stats = &self.shared.stats;
        PoolStats::bump(&stats.completed);
        if outcome.is_err() {
            PoolStats::bump(&stats.failed);
        }
        if role == ThreadRole::Main {
            PoolStats::bump(&stats.main_thread);
        }
        self.shared.finish(&output, outcome);
    }

    /// Waits for `target` to signal, running queued work while waiting.
    ///
    /// On the main thread this drains main-thread tasks first, then helps
    /// with generic tasks; on a worker it runs tasks of the worker's class.
    /// On a thread outside the pool it simply blocks.
    pub fn yield_until_finished(&self, target: &impl AsBarrier) -> TaskResult<()> {
        let barrier = target.as_barrier();
        let role = self.current_role();
        if role == ThreadRole::External {
            return barrier.wait();
        }
        let poll = self.shared.config.idle_poll();
        loop {
            if let Some(outcome) = barrier.outcome() {
                return outcome;
            }
            if !self.run_one(role) {
                let _ = barrier.wait_timeout(poll);
            }
        }
    }

    /// Runs queued work until `deadline` passes.
    pub fn yield_until(&self, deadline: Instant) {
        let role = self.current_role();
        let poll = self.shared.config.idle_poll();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            if !self.run_one(role) {
                thread::sleep(poll.min(deadline - now));
            }
        }
    }

    /// Runs queued work for `duration`.
    pub fn yield_for(&self, duration: Duration) {
        self.yield_until(Instant::now() + duration);
    }

    /// Waits until every scheduled task has finished, running work while waiting.
    pub fn yield_until_idle(&self) {
        let role = self.current_role();
        let poll = self.shared.config.idle_poll();
        loop {
            if *self.shared.in_flight.lock() == 0 {
                return;
            }
            if role == ThreadRole::External || !self.run_one(role) {
                let mut in_flight = self.shared.in_flight.lock();
                if *in_flight > 0 {
                    self.shared.idle.wait_for(&mut in_flight, poll);
                }
            }
        }
    }

    /// Runs every queued main-thread task. Returns how many ran.
    ///
    /// # Panics
    ///
    /// Panics if called from any thread other than the main thread.
    pub fn process_main_thread_tasks(&self) -> usize {
        assert!(
            self.is_main_thread(),
            "main-thread tasks processed off the main thread"
        );
        let mut ran = 0;
        while let Ok(task) = self.shared.main_rx.try_recv() {
            self.run(task, ThreadRole::Main);
            ran += 1;
        }
        ran
    }

    /// Returns the number of main-thread tasks waiting to run.
    pub fn pending_main_thread_tasks(&self) -> usize {
        self.shared.main_rx.len()
    }

    /// Returns the number of tasks scheduled but not finished yet.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    /// Returns the pool's live counters.
    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    /// Returns the configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pool", &self.shared.id)
            .field("ready", &self.shared.generic.len())
            .field("ready_io", &self.shared.io.len())
            .field("main_thread", &self.shared.main_rx.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl StatSource for TaskQueue {
    /// Pool counters plus gauges for the current queue depths.
    fn sample(&self) -> Vec<(MetricId, MetricValue)> {
        let mut samples = self.shared.stats.sample();
        samples.extend([
            ("ready_tasks", self.shared.generic.len()),
            ("ready_io_tasks", self.shared.io.len()),
            ("main_thread_queue", self.shared.main_rx.len()),
            ("in_flight", self.in_flight()),
        ]
        .into_iter()
        .map(|(name, depth)| (MetricId::new("pool", name), MetricValue::Gauge(depth as f64))));
        samples
    }
}

/// Owns the worker threads. Shuts down when dropped.
pub struct ThreadPool {
    queue: TaskQueue,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool without starting any thread.
    ///
    /// Tasks can already be made and scheduled; they run once the pool is
    /// started, or when the main thread yields.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            queue: TaskQueue::new(config),
            workers: Vec::new(),
        }
    }

    /// Creates and starts a pool on the calling thread.
    pub fn start(config: PoolConfig) -> std::io::Result<Self> {
        let mut pool = Self::new(config);
        pool.startup()?;
        Ok(pool)
    }

    /// Spawns the workers and makes the calling thread the main thread.
    ///
    /// Calling this on a pool that is already running or shut down is a no-op.
    pub fn startup(&mut self) -> std::io::Result<()> {
        let shared = &self.queue.shared;
        if shared
            .state
            .compare_exchange(
                STATE_IDLE,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            log::warn!("Thread pool startup ignored: the pool is not idle.");
            return Ok(());
        }
        worker::bind(shared.id, ThreadRole::Main);

        let workers = shared.config.resolved_worker_threads();
        let io_workers = shared.config.io_threads;
        let prefix = shared.config.thread_name_prefix.clone();
        let roles = (0..workers)
            .map(|i| (format!("{prefix}-worker-{i}"), ThreadRole::Worker(i)))
            .chain((0..io_workers).map(|i| (format!("{prefix}-io-{i}"), ThreadRole::Io(i))));
        for (name, role) in roles {
            let queue = self.queue.clone();
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || worker::run(queue, role))?;
            self.workers.push(handle);
        }

        log::info!(
            "Thread pool started: {workers} CPU workers, {io_workers} I/O workers."
        );
        Ok(())
    }

    /// Stops the workers and fails every task that has not run.
    ///
    /// Tasks already executing finish first. Calling this twice is a no-op.
    pub fn shutdown(&mut self) {
        let shared = self.queue.shared.clone();
        if shared.state.swap(STATE_SHUT_DOWN, Ordering::AcqRel) == STATE_SHUT_DOWN {
            return;
        }
        shared.generic.wake_all();
        shared.io.wake_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("A worker thread panicked outside of a task.");
            }
        }

        drop(shared.main_tx.lock().take());
        let mut dropped = 0usize;
        for task in shared
            .generic
            .close()
            .into_iter()
            .chain(shared.io.close())
            .chain(shared.main_rx.try_iter())
        {
            shared.cancel(task);
            dropped += 1;
        }

        let unscheduled: Vec<Pending> = shared.pending.lock().drain().map(|(_, p)| p).collect();
        for Pending { task, .. } in unscheduled {
            task.output.fail(TaskError::PoolShutDown);
            dropped += 1;
        }

        log::info!("Thread pool shut down ({dropped} tasks dropped).");
    }

    /// Returns the queue handle.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Runs every queued main-thread task. See [`TaskQueue::process_main_thread_tasks`].
    pub fn process_main_thread_tasks(&self) -> usize {
        self.queue.process_main_thread_tasks()
    }

    /// Returns the number of worker threads currently owned.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// A pool with no background threads: only the main thread runs tasks.
    fn inline_pool() -> ThreadPool {
        ThreadPool::start(PoolConfig::default().with_workers(0).with_io_threads(0)).unwrap()
    }

    #[test]
    fn made_task_does_not_run_until_scheduled() {
        let pool = inline_pool();
        let queue = pool.queue();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let id = queue.make(TaskDesc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let output = queue.output_of(id).unwrap();

        queue.yield_for(Duration::from_millis(5));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        queue.schedule(id);
        queue.yield_until_finished(&output).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(queue.output_of(id).is_some_and(|done| done.is_signaled()));

        drop(output);
        assert!(queue.output_of(id).is_none());
    }

    #[test]
    fn dependencies_gate_readiness() {
        let pool = inline_pool();
        let queue = pool.queue();
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = order.clone();
        let second = queue.make(TaskDesc::new(move |_| {
            log.lock().push("second");
            Ok(())
        }));
        let log = order.clone();
        let first = queue.make(TaskDesc::new(move |_| {
            log.lock().push("first");
            Ok(())
        }));
        let done = queue.output_of(second).unwrap();

        let _ = queue.dependencies(second).after_task(first);
        queue.schedule(second);
        queue.schedule(first);
        queue.yield_until_finished(&done).unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn external_barrier_dependency() {
        let pool = inline_pool();
        let queue = pool.queue();
        let gate = TaskBarrier::new(1);
        let id = queue.make(TaskDesc::new(|_| Ok(())));
        let done = queue.output_of(id).unwrap();
        let _ = queue.dependencies(id).after(&gate);
        queue.schedule(id);

        queue.yield_for(Duration::from_millis(5));
        assert!(!done.is_signaled());
        gate.decrement();
        assert!(queue.yield_until_finished(&done).is_ok());
    }

    #[test]
    fn priority_orders_ready_tasks() {
        let pool = inline_pool();
        let queue = pool.queue();
        let order = Arc::new(Mutex::new(Vec::new()));
        let outputs: Vec<TaskBarrier> = [(1, 0), (2, 10), (3, 0), (4, 5)]
            .into_iter()
            .map(|(tag, priority)| {
                let log = order.clone();
                queue.submit(
                    TaskDesc::new(move |_| {
                        log.lock().push(tag);
                        Ok(())
                    })
                    .priority(priority),
                )
            })
            .collect();
        let all = TaskBarrier::all(&outputs);
        queue.yield_until_finished(&all).unwrap();
        assert_eq!(*order.lock(), vec![2, 4, 1, 3]);
    }

    #[test]
    fn errors_and_panics_are_captured() {
        let pool = ThreadPool::start(PoolConfig::default().with_workers(2)).unwrap();
        let queue = pool.queue();

        let failed = queue.submit(TaskDesc::new(|_| anyhow::bail!("no such file")));
        let panicked = queue.submit(TaskDesc::new(|_| panic!("kaboom")));
        let fine = queue.submit(TaskDesc::new(|_| Ok(())));

        let err = queue.yield_until_finished(&failed).unwrap_err();
        assert!(err.to_string().contains("no such file"));
        match queue.yield_until_finished(&panicked) {
            Err(TaskError::Panicked { message }) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(queue.yield_until_finished(&fine).is_ok());
        assert!(queue.stats().snapshot().tasks_failed >= 2);
    }

    #[test]
    fn failed_dependency_skips_the_body() {
        let pool = inline_pool();
        let queue = pool.queue();
        let ran = Arc::new(AtomicUsize::new(0));

        let upstream = queue.make(TaskDesc::new(|_| anyhow::bail!("decode error")));
        let counter = ran.clone();
        let downstream = queue.make(TaskDesc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let done = queue.output_of(downstream).unwrap();
        let _ = queue.dependencies(downstream).after_task(upstream);
        queue.schedule(downstream);
        queue.schedule(upstream);

        let err = queue.yield_until_finished(&done).unwrap_err();
        assert!(matches!(err, TaskError::DependencyFailed(_)));
        assert!(matches!(err.root_cause(), TaskError::Failed(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.stats().snapshot().tasks_skipped, 1);
    }

    #[test]
    fn failed_upstream_that_already_finished_still_skips_dependents() {
        let pool = inline_pool();
        let queue = pool.queue();
        let ran = Arc::new(AtomicUsize::new(0));

        let upstream = queue.make(TaskDesc::new(|_| anyhow::bail!("decode error")));
        let upstream_done = queue.output_of(upstream).unwrap();
        queue.schedule(upstream);
        assert!(queue.yield_until_finished(&upstream_done).is_err());

        let counter = ran.clone();
        let downstream = queue.make(TaskDesc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let done = queue.output_of(downstream).unwrap();
        let _ = queue.dependencies(downstream).after_task(upstream);
        queue.schedule(downstream);

        let err = queue.yield_until_finished(&done).unwrap_err();
        assert!(matches!(err, TaskError::DependencyFailed(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "never made by this queue")]
    fn depending_on_an_unknown_task_panics() {
        let pool = inline_pool();
        let id = pool.queue().make(TaskDesc::new(|_| Ok(())));
        let _ = pool.queue().dependencies(id).after_task(TaskId(id.0 + 100));
    }

    #[test]
    fn main_thread_tasks_run_on_the_main_thread() {
        let pool = ThreadPool::start(PoolConfig::default().with_workers(2)).unwrap();
        let queue = pool.queue().clone();
        let main_id = thread::current().id();

        let future = queue.spawn(TaskKind::Generic, |params| {
            let upload = params
                .queue
                .spawn(TaskKind::MainThread, |p| Ok((thread::current().id(), p.role)));
            Ok(upload)
        });
        queue.yield_until_finished(&future).unwrap();
        let upload = future.get().unwrap().clone();
        queue.yield_until_finished(&upload).unwrap();

        let (ran_on, role) = *upload.get().unwrap();
        assert_eq!(ran_on, main_id);
        assert_eq!(role, ThreadRole::Main);
        assert!(queue.stats().snapshot().main_thread_tasks >= 1);
    }

    #[test]
    fn process_main_thread_tasks_drains_the_queue() {
        let pool = inline_pool();
        let queue = pool.queue();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = ran.clone();
            queue.submit(
                TaskDesc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .kind(TaskKind::MainThread),
            );
        }
        assert_eq!(queue.pending_main_thread_tasks(), 3);
        assert_eq!(pool.process_main_thread_tasks(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[test]
    #[should_panic(expected = "off the main thread")]
    fn processing_main_thread_tasks_elsewhere_panics() {
        let pool = ThreadPool::new(PoolConfig::default());
        pool.queue().process_main_thread_tasks();
    }

    #[test]
    fn io_tasks_run_on_io_workers() {
        let pool = ThreadPool::start(PoolConfig::default().with_workers(1).with_io_threads(1)).unwrap();
        let role = pool.queue().spawn(TaskKind::FileIo, |p| Ok(p.role));
        pool.queue().yield_until_finished(&role).unwrap();
        assert_eq!(*role.get().unwrap(), ThreadRole::Io(0));
    }

    #[test]
    fn yield_until_idle_waits_for_everything() {
        let pool = ThreadPool::start(PoolConfig::default().with_workers(3)).unwrap();
        let queue = pool.queue();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let counter = ran.clone();
            queue.submit(TaskDesc::new(move |_| {
                thread::sleep(Duration::from_micros(200));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        queue.yield_until_idle();
        assert_eq!(ran.load(Ordering::SeqCst), 32);
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn shutdown_fails_queued_and_unscheduled_tasks() {
        let mut pool = ThreadPool::new(PoolConfig::default().with_workers(1));
        let queue = pool.queue().clone();
        let queued = queue.submit(TaskDesc::new(|_| Ok(())));
        let unscheduled = queue.make(TaskDesc::new(|_| Ok(())));
        let unscheduled = queue.output_of(unscheduled).unwrap();
        let gated_on = TaskBarrier::new(1);
        let gated = queue.make(TaskDesc::new(|_| Ok(())));
        let gated_done = queue.output_of(gated).unwrap();
        let _ = queue.dependencies(gated).after(&gated_on);
        queue.schedule(gated);

        pool.shutdown();
        assert!(matches!(queued.wait(), Err(TaskError::PoolShutDown)));
        assert!(matches!(unscheduled.wait(), Err(TaskError::PoolShutDown)));

        gated_on.decrement();
        assert!(matches!(gated_done.wait(), Err(TaskError::PoolShutDown)));

        let late = queue.submit(TaskDesc::new(|_| Ok(())));
        assert!(matches!(late.wait(), Err(TaskError::PoolShutDown)));
    }

    #[test]
    fn tasks_admitted_after_queues_close_are_cancelled() {
        // An admission that passed the shutdown check after the queues closed.
        let pool = ThreadPool::new(PoolConfig::default().with_workers(1));
        let queue = pool.queue();
        assert!(queue.shared.generic.close().is_empty());
        drop(queue.shared.main_tx.lock().take());

        let generic = queue.submit(TaskDesc::new(|_| Ok(())));
        let main = queue.submit(TaskDesc::new(|_| Ok(())).kind(TaskKind::MainThread));
        assert!(matches!(generic.wait(), Err(TaskError::PoolShutDown)));
        assert!(matches!(main.wait(), Err(TaskError::PoolShutDown)));
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn gates_released_during_shutdown_never_strand_tasks() {
        for _ in 0..20 {
            let mut pool = ThreadPool::start(PoolConfig::default().with_workers(2)).unwrap();
            let queue = pool.queue().clone();
            let gates: Vec<TaskBarrier> = (0..64).map(|_| TaskBarrier::new(1)).collect();
            let outputs: Vec<TaskBarrier> = gates
                .iter()
                .enumerate()
                .map(|(i, gate)| {
                    let kind = if i % 2 == 0 {
                        TaskKind::Generic
                    } else {
                        TaskKind::MainThread
                    };
                    let id = queue.make(TaskDesc::new(|_| Ok(())).kind(kind));
                    let output = queue.output_of(id).unwrap();
                    let _ = queue.dependencies(id).after(gate);
                    queue.schedule(id);
                    output
                })
                .collect();

            let releaser = thread::spawn(move || gates.iter().for_each(TaskBarrier::decrement));
            pool.shutdown();
            releaser.join().unwrap();
            for output in &outputs {
                assert!(output.wait_timeout(Duration::from_secs(5)).is_some());
            }
        }
    }

    #[test]
    fn spawned_future_reports_cancellation() {
        let mut pool = ThreadPool::new(PoolConfig::default());
        let future = pool.queue().spawn(TaskKind::Generic, |_| Ok(5u32));
        pool.shutdown();
        assert!(matches!(future.wait(), Err(TaskError::PoolShutDown)));
    }

    #[test]
    #[should_panic(expected = "scheduled twice")]
    fn double_schedule_panics() {
        let pool = inline_pool();
        let id = pool.queue().make(TaskDesc::new(|_| Ok(())));
        pool.queue().schedule(id);
        pool.queue().schedule(id);
    }
}
