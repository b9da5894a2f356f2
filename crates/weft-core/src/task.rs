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

//! Task descriptions: the unit of work accepted by the [`TaskQueue`](crate::pool::TaskQueue).

use crate::barrier::TaskBarrier;
use crate::pool::TaskQueue;
use std::fmt;

/// Where a task is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskKind {
    /// CPU work that can run on any CPU worker.
    #[default]
    Generic,
    /// Work that blocks on I/O. Runs on the dedicated I/O workers so it never
    /// starves CPU workers.
    FileIo,
    /// Work that must run on the thread owning the graphics context. Queued to
    /// the main-thread queue and drained once per frame.
    MainThread,
}

/// Identifies a task between [`make`](crate::pool::TaskQueue::make) and
/// [`schedule`](crate::pool::TaskQueue::schedule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// The thread a task body is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadRole {
    /// The thread that started the pool (owner of the graphics context).
    Main,
    /// A CPU worker, by index.
    Worker(usize),
    /// A blocking-I/O worker, by index.
    Io(usize),
    /// Any thread not owned by the pool.
    External,
}

/// Context handed to every task body.
pub struct TaskParams<'a> {
    /// The queue that is running the task. Use it to submit follow-up work.
    pub queue: &'a TaskQueue,
    /// The thread the body is running on.
    pub role: ThreadRole,
}

/// The callable of a task.
pub type TaskBody = Box<dyn FnOnce(&TaskParams<'_>) -> anyhow::Result<()> + Send + 'static>;

/// A description of a task before it is handed to a queue.
///
/// ```
/// use weft_core::task::{TaskDesc, TaskKind};
///
/// let desc = TaskDesc::new(|_params| Ok(()))
///     .kind(TaskKind::FileIo)
///     .priority(10)
///     .name("read-config");
/// assert_eq!(desc.task_kind(), TaskKind::FileIo);
/// ```
pub struct TaskDesc {
    pub(crate) body: TaskBody,
    pub(crate) kind: TaskKind,
    pub(crate) output: Option<TaskBarrier>,
    pub(crate) priority: i32,
    pub(crate) name: Option<String>,
}

impl TaskDesc {
    /// Wraps `body` as a generic-kind task with priority 0.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(&TaskParams<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            body: Box::new(body),
            kind: TaskKind::Generic,
            output: None,
            priority: 0,
            name: None,
        }
    }

    /// Sets the task kind.
    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the barrier the task decrements when it completes.
    ///
    /// Several tasks can share one output barrier; its count must account for
    /// each of them.
    pub fn output(mut self, barrier: TaskBarrier) -> Self {
        self.output = Some(barrier);
        self
    }

    /// Sets the scheduling priority. Higher runs first among ready tasks.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Names the task for logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the task kind.
    pub fn task_kind(&self) -> TaskKind {
        self.kind
    }
}

impl fmt::Debug for TaskDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDesc")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// A task owned by a queue.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) body: TaskBody,
    pub(crate) kind: TaskKind,
    pub(crate) output: TaskBarrier,
    pub(crate) priority: i32,
    pub(crate) name: Option<String>,
}

impl Task {
    pub(crate) fn label(&self) -> String {
        describe(self.id, self.name.as_deref())
    }
}

pub(crate) fn describe(id: TaskId, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{id} ({name})"),
        None => id.to_string(),
    }
}
