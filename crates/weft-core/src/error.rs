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

//! Error types carried by barriers, futures and the task queue.

use std::sync::Arc;
use thiserror::Error;

/// The failure state attached to a signaled barrier.
///
/// Errors are shared between every waiter of a barrier, so the payload of a
/// failed task body is kept behind an `Arc` and the whole enum is `Clone`.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task body returned an error.
    #[error("task failed: {0:#}")]
    Failed(Arc<anyhow::Error>),

    /// The task body panicked. The panic payload is rendered to a string.
    #[error("task panicked: {message}")]
    Panicked {
        /// The panic message, or a placeholder when the payload was not a string.
        message: String,
    },

    /// A barrier this task depended on signaled with a failure, so the body never ran.
    #[error("dependency failed: {0}")]
    DependencyFailed(Box<TaskError>),

    /// The pool was shut down before the task could run.
    #[error("task pool shut down before the task ran")]
    PoolShutDown,

    /// The producing side of a future was dropped without ever completing it.
    #[error("promise dropped without a value")]
    BrokenPromise,
}

impl TaskError {
    /// Wraps an arbitrary error returned by a task body or a loader.
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        TaskError::Failed(Arc::new(error.into()))
    }

    /// Builds a [`TaskError::Panicked`] from a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        TaskError::Panicked { message }
    }

    /// Wraps this error as the cause of a skipped dependent task.
    pub fn into_dependency_failure(self) -> Self {
        TaskError::DependencyFailed(Box::new(self))
    }

    /// Returns the innermost error, looking through dependency chains.
    pub fn root_cause(&self) -> &TaskError {
        match self {
            TaskError::DependencyFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

/// Result alias for operations that observe a barrier outcome.
pub type TaskResult<T> = Result<T, TaskError>;
