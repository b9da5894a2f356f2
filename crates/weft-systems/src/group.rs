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

//! Named task groups invoked once per frame with shared parameters.
//!
//! A [`ParameterizedTaskGroup`] holds an ordered list of tasks and nested
//! groups. Each [`apply`](ParameterizedTaskGroup::apply) schedules one task
//! per entry, all reading the same parameters, and returns the barrier of
//! that invocation. An invocation never starts before the previous one has
//! signaled, so a group's tasks never overlap themselves across frames.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use weft_core::{TaskBarrier, TaskDesc, TaskKind, TaskParams, TaskQueue};

type GroupTaskFn<P> = dyn Fn(&P, &TaskParams<'_>) -> anyhow::Result<()> + Send + Sync;

/// A reusable task body run by a group on every invocation.
pub struct ParameterizedTask<P> {
    name: String,
    kind: TaskKind,
    priority: i32,
    body: Arc<GroupTaskFn<P>>,
}

impl<P: Send + Sync + 'static> ParameterizedTask<P> {
    /// Creates a generic task named `name`.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&P, &TaskParams<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: TaskKind::Generic,
            priority: 0,
            body: Arc::new(body),
        }
    }

    /// Sets where the task runs.
    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the priority of every task this entry produces.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns the task's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn desc(&self, params: Arc<P>, group: &str, output: TaskBarrier) -> TaskDesc {
        let body = self.body.clone();
        TaskDesc::new(move |task| body(&params, task))
            .kind(self.kind)
            .priority(self.priority)
            .name(format!("{group}/{}", self.name))
            .output(output)
    }
}

impl<P> Clone for ParameterizedTask<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            priority: self.priority,
            body: self.body.clone(),
        }
    }
}

impl<P> fmt::Debug for ParameterizedTask<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterizedTask")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish()
    }
}

struct GroupState<P> {
    tasks: Vec<ParameterizedTask<P>>,
    groups: Vec<ParameterizedTaskGroup<P>>,
    /// Barrier of the latest invocation.
    barrier: TaskBarrier,
    invocations: u64,
}

struct GroupInner<P> {
    name: String,
    state: Mutex<GroupState<P>>,
}

/// An ordered, named collection of tasks sharing one barrier per invocation.
///
/// Cloning a group yields another handle to the same group, so a group can
/// be registered by name and nested into a frame processor at once.
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use weft_core::{PoolConfig, ThreadPool};
/// use weft_systems::{ParameterizedTask, ParameterizedTaskGroup};
///
/// let pool = ThreadPool::start(PoolConfig::default().with_workers(1)).unwrap();
/// let total = Arc::new(AtomicU32::new(0));
/// let group = ParameterizedTaskGroup::new("physics");
/// for name in ["integrate", "collide"] {
///     let total = total.clone();
///     group.add(ParameterizedTask::new(name, move |step: &u32, _| {
///         total.fetch_add(*step, Ordering::SeqCst);
///         Ok(())
///     }));
/// }
///
/// let done = group.apply(3, pool.queue());
/// pool.queue().yield_until_finished(&done).unwrap();
/// assert_eq!(total.load(Ordering::SeqCst), 6);
/// ```
pub struct ParameterizedTaskGroup<P> {
    inner: Arc<GroupInner<P>>,
}

impl<P: Send + Sync + 'static> ParameterizedTaskGroup<P> {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                state: Mutex::new(GroupState {
                    tasks: Vec::new(),
                    groups: Vec::new(),
                    barrier: TaskBarrier::signaled(),
                    invocations: 0,
                }),
            }),
        }
    }

    /// Returns the group's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Appends a task. It takes part from the next invocation on.
    pub fn add(&self, task: ParameterizedTask<P>) {
        self.inner.state.lock().tasks.push(task);
    }

    /// Replaces the task named like `task` in place, or appends it.
    /// Returns `true` if a task was replaced.
    pub fn replace(&self, task: ParameterizedTask<P>) -> bool {
        let mut state = self.inner.state.lock();
        match state.tasks.iter_mut().find(|existing| existing.name == task.name) {
            Some(existing) => {
                *existing = task;
                true
            }
            None => {
                state.tasks.push(task);
                false
            }
        }
    }

    /// Appends a task built from a closure.
    pub fn add_fn<F>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(&P, &TaskParams<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(ParameterizedTask::new(name, body));
    }

    /// Nests `group`; its tasks run as part of every invocation of this one.
    ///
    /// # Panics
    ///
    /// Panics if `group` is this group.
    pub fn add_group(&self, group: &ParameterizedTaskGroup<P>) {
        assert!(
            !self.ptr_eq(group),
            "group '{}' cannot contain itself",
            self.inner.name
        );
        self.inner.state.lock().groups.push(group.clone());
    }

    /// Removes every task named `name`. Returns `true` if any was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|task| task.name != name);
        state.tasks.len() != before
    }

    /// Removes every task and nested group.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.tasks.clear();
        state.groups.clear();
    }

    /// Returns the number of tasks, not counting nested groups.
    pub fn len(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Returns `true` if the group has neither tasks nor nested groups.
    pub fn is_empty(&self) -> bool {
        let state = self.inner.state.lock();
        state.tasks.is_empty() && state.groups.is_empty()
    }

    /// Returns the number of nested groups.
    pub fn group_count(&self) -> usize {
        self.inner.state.lock().groups.len()
    }

    /// Returns the barrier of the latest invocation.
    ///
    /// A group that was never applied returns a signaled barrier.
    pub fn barrier(&self) -> TaskBarrier {
        self.inner.state.lock().barrier.clone()
    }

    /// Returns how many times the group was applied.
    pub fn invocations(&self) -> u64 {
        self.inner.state.lock().invocations
    }

    /// Returns `true` if both handles refer to the same group.
    pub fn ptr_eq(&self, other: &ParameterizedTaskGroup<P>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Schedules one invocation with `params` and returns its barrier.
    pub fn apply(&self, params: P, queue: &TaskQueue) -> TaskBarrier {
        self.apply_after(params, queue, std::iter::empty::<&TaskBarrier>())
    }

    /// Schedules one invocation that also waits for every barrier in `deps`.
    ///
    /// A failed dependency skips the invocation's tasks and fails its
    /// barrier. A failed previous invocation only delays this one.
    pub fn apply_after<'a>(
        &self,
        params: P,
        queue: &TaskQueue,
        deps: impl IntoIterator<Item = &'a TaskBarrier>,
    ) -> TaskBarrier {
        let gate = TaskBarrier::all(deps);
        self.invoke(&Arc::new(params), queue, &gate)
    }

    fn invoke(&self, params: &Arc<P>, queue: &TaskQueue, gate: &TaskBarrier) -> TaskBarrier {
        let mut state = self.inner.state.lock();
        let start = TaskBarrier::lock()
            .connect(gate)
            .connect(&state.barrier.settled())
            .finish();

        let mut done = TaskBarrier::lock().connect(&start);
        for task in &state.tasks {
            let output = TaskBarrier::new(1);
            let id = queue.make(task.desc(params.clone(), &self.inner.name, output.clone()));
            let _ = queue.dependencies(id).after(&start);
            queue.schedule(id);
            done = done.connect(&output);
        }
        for group in &state.groups {
            done = done.connect(&group.invoke(params, queue, &start));
        }
        if state.tasks.is_empty() && state.groups.is_empty() {
            // Completes through the queue rather than inline, so a backlog of
            // empty invocations cannot chain callbacks on one stack.
            let output = TaskBarrier::new(1);
            let id = queue.make(
                TaskDesc::new(|_| Ok(()))
                    .name(format!("{}/(empty)", self.inner.name))
                    .output(output.clone()),
            );
            let _ = queue.dependencies(id).after(&start);
            done = done.connect(&output);
            queue.schedule(id);
        }

        let barrier = done.finish();
        state.barrier = barrier.clone();
        state.invocations += 1;
        log::trace!(
            "Group '{}' invocation {} scheduled {} tasks and {} nested groups.",
            self.inner.name,
            state.invocations,
            state.tasks.len(),
            state.groups.len()
        );
        barrier
    }
}

impl<P> Clone for ParameterizedTaskGroup<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> fmt::Debug for ParameterizedTaskGroup<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ParameterizedTaskGroup")
            .field("name", &self.inner.name)
            .field("tasks", &state.tasks)
            .field("groups", &state.groups.len())
            .field("invocations", &state.invocations)
            .finish()
    }
}
