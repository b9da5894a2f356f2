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

//! Write-once value channels built on [`TaskBarrier`].
//!
//! A [`Promise`] is the producer's exclusive slot; a [`Future`] is a cheap,
//! cloneable, read-only view of the same slot. The value becomes readable
//! once the promise's barrier signals, so a future can be connected into any
//! barrier graph (`TaskBarrier::lock().connect(&future)`) or used as a task
//! dependency.
//!
//! Reading a future before it is ready, or completing a promise twice, is a
//! broken task graph rather than a runtime condition: [`Future::get`] and
//! [`Promise::set`] panic in that case. The `try_*` variants report it
//! instead.
//!
//! ```
//! use weft_core::future::channel;
//!
//! let (promise, future) = channel::<u32>();
//! let doubled = future.map(|v| v * 2);
//! promise.set(21);
//! assert_eq!(*doubled.get().unwrap(), 42);
//! ```

use crate::barrier::{AsBarrier, TaskBarrier};
use crate::error::{TaskError, TaskResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Misuse reported by the non-panicking accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FutureError {
    /// The promise was already set or failed.
    #[error("promise already completed")]
    AlreadyCompleted,
    /// The future was read before its barrier signaled.
    #[error("future read before its barrier signaled")]
    NotReady,
}

struct FutureState<T> {
    barrier: TaskBarrier,
    value: OnceLock<T>,
    completed: AtomicBool,
}

impl<T> FutureState<T> {
    fn new() -> Self {
        Self {
            barrier: TaskBarrier::new(1),
            value: OnceLock::new(),
            completed: AtomicBool::new(false),
        }
    }

    /// Claims the single completion right.
    fn claim(&self) -> Result<(), FutureError> {
        if self.completed.swap(true, Ordering::AcqRel) {
            Err(FutureError::AlreadyCompleted)
        } else {
            Ok(())
        }
    }

    fn read(&self) -> Option<TaskResult<&T>> {
        let outcome = self.barrier.outcome()?;
        Some(outcome.map(|()| match self.value.get() {
            Some(value) => value,
            None => unreachable!("future signaled successfully without a value"),
        }))
    }
}

/// Creates a connected promise/future pair.
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let promise = Promise::new();
    let future = promise.future();
    (promise, future)
}

/// Creates a connected pair whose consumer side takes the value by move.
pub fn unique_channel<T>() -> (UniquePromise<T>, UniqueFuture<T>) {
    let (promise, future) = channel();
    (UniquePromise { inner: promise }, UniqueFuture { inner: future })
}

/// The producing side of a [`Future`]. Completes exactly once.
///
/// Dropping a promise that was never completed fails its future with
/// [`TaskError::BrokenPromise`] (or [`TaskError::Panicked`] when the drop
/// happens while unwinding), so readers are not left waiting forever.
pub struct Promise<T> {
    state: Arc<FutureState<T>>,
}

impl<T> Promise<T> {
    /// Creates a promise with no future attached yet.
    pub fn new() -> Self {
        Self {
            state: Arc::new(FutureState::new()),
        }
    }

    /// Returns a future reading from this promise. Can be called many times.
    pub fn future(&self) -> Future<T> {
        Future {
            state: self.state.clone(),
        }
    }

    /// Returns the barrier that signals when this promise completes.
    pub fn barrier(&self) -> &TaskBarrier {
        &self.state.barrier
    }

    /// Returns `true` once the promise was set or failed.
    pub fn is_completed(&self) -> bool {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Stores `value` and signals the future, or reports that the promise was already completed.
    pub fn try_set(&self, value: T) -> Result<(), FutureError> {
        self.state.claim()?;
        if self.state.value.set(value).is_err() {
            unreachable!("promise value written twice despite completion claim");
        }
        self.state.barrier.decrement();
        Ok(())
    }

    /// Stores `value` and signals the future.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already set or failed.
    pub fn set(&self, value: T) {
        if self.try_set(value).is_err() {
            panic!("promise for {} set twice", self.state.barrier.id());
        }
    }

    /// Signals the future with `error`, or reports that the promise was already completed.
    pub fn try_fail(&self, error: TaskError) -> Result<(), FutureError> {
        self.state.claim()?;
        self.state.barrier.fail(error);
        Ok(())
    }

    /// Signals the future with `error`.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already set or failed.
    pub fn fail(&self, error: TaskError) {
        if self.try_fail(error).is_err() {
            panic!("promise for {} completed twice", self.state.barrier.id());
        }
    }

    /// Sets or fails the promise from a task result.
    pub fn complete(&self, result: TaskResult<T>) {
        match result {
            Ok(value) => self.set(value),
            Err(error) => self.fail(error),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.state.claim().is_ok() {
            log::debug!(
                "promise for {} dropped without a value",
                self.state.barrier.id()
            );
            let error = if std::thread::panicking() {
                TaskError::Panicked {
                    message: "producer panicked before completing the promise".to_string(),
                }
            } else {
                TaskError::BrokenPromise
            };
            self.state.barrier.fail(error);
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("barrier", &self.state.barrier)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// A shared, read-only view of a promised value.
///
/// Every clone observes the same value; after the barrier signals, `get`
/// always returns a reference to the same object.
pub struct Future<T> {
    state: Arc<FutureState<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Future<T> {
    /// Returns a future that is already resolved to `value`.
    pub fn ready(value: T) -> Self {
        let (promise, future) = channel();
        promise.set(value);
        future
    }

    /// Returns a future that is already failed with `error`.
    pub fn failed(error: TaskError) -> Self {
        let (promise, future) = channel();
        promise.fail(error);
        future
    }

    /// Returns `true` once the backing barrier has signaled.
    pub fn is_ready(&self) -> bool {
        self.state.barrier.is_signaled()
    }

    /// Returns the barrier that signals when the value is available.
    pub fn barrier(&self) -> &TaskBarrier {
        &self.state.barrier
    }

    /// Reads the value, or `None` if the barrier has not signaled yet.
    pub fn try_get(&self) -> Option<TaskResult<&T>> {
        self.state.read()
    }

    /// Reads the value.
    ///
    /// # Panics
    ///
    /// Panics if the barrier has not signaled yet. Wait on the future, or
    /// gate the reading task on it, before calling this.
    pub fn get(&self) -> TaskResult<&T> {
        match self.state.read() {
            Some(result) => result,
            None => panic!(
                "future for {} read before its barrier signaled",
                self.state.barrier.id()
            ),
        }
    }

    /// Blocks the calling thread until the value is available.
    pub fn wait(&self) -> TaskResult<&T> {
        self.state.barrier.wait()?;
        self.get()
    }

    /// Returns `true` if both futures read from the same promise.
    pub fn ptr_eq(&self, other: &Future<T>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    /// Completes `promise` with `f(value)` when this future resolves.
    ///
    /// A failure of this future is forwarded to `promise` unchanged. `f` runs
    /// on the thread that signals this future.
    pub fn pipe<U, F>(&self, promise: Promise<U>, f: F)
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.try_pipe(promise, move |value| Ok(f(value)));
    }

    /// Like [`pipe`](Future::pipe), with a fallible conversion.
    pub fn try_pipe<U, F>(&self, promise: Promise<U>, f: F)
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> anyhow::Result<U> + Send + 'static,
    {
        let state = self.state.clone();
        self.state.barrier.set_callback(move |outcome| match outcome {
            Ok(()) => match state.value.get() {
                Some(value) => promise.complete(f(value).map_err(TaskError::failed)),
                None => unreachable!("future signaled successfully without a value"),
            },
            Err(error) => promise.fail(error.clone()),
        });
    }

    /// Returns a new future resolving to `f(value)`.
    pub fn map<U, F>(&self, f: F) -> Future<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let (promise, future) = channel();
        self.pipe(promise, f);
        future
    }
}

impl<T> AsBarrier for Future<T> {
    fn as_barrier(&self) -> &TaskBarrier {
        &self.state.barrier
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("barrier", &self.state.barrier)
            .finish()
    }
}

/// The producing side of a [`UniqueFuture`].
pub struct UniquePromise<T> {
    inner: Promise<Mutex<Option<T>>>,
}

impl<T> UniquePromise<T> {
    /// Returns the barrier that signals when this promise completes.
    pub fn barrier(&self) -> &TaskBarrier {
        self.inner.barrier()
    }

    /// Stores `value`, or reports that the promise was already completed.
    pub fn try_set(&self, value: T) -> Result<(), FutureError> {
        self.inner.try_set(Mutex::new(Some(value)))
    }

    /// Stores `value`.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already completed.
    pub fn set(&self, value: T) {
        self.inner.set(Mutex::new(Some(value)));
    }

    /// Signals the future with `error`.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already completed.
    pub fn fail(&self, error: TaskError) {
        self.inner.fail(error);
    }

    /// Sets or fails the promise from a task result.
    pub fn complete(&self, result: TaskResult<T>) {
        self.inner.complete(result.map(|value| Mutex::new(Some(value))));
    }
}

/// A single-consumer future: the value is moved out exactly once.
pub struct UniqueFuture<T> {
    inner: Future<Mutex<Option<T>>>,
}

impl<T> UniqueFuture<T> {
    /// Returns `true` once the backing barrier has signaled.
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Returns the barrier that signals when the value is available.
    pub fn barrier(&self) -> &TaskBarrier {
        self.inner.barrier()
    }

    /// Moves the value out, or hands the future back if it is not ready yet.
    pub fn try_take(self) -> Result<TaskResult<T>, Self> {
        if self.is_ready() {
            Ok(self.take())
        } else {
            Err(self)
        }
    }

    /// Moves the value out.
    ///
    /// # Panics
    ///
    /// Panics if the barrier has not signaled yet.
    pub fn take(self) -> TaskResult<T> {
        let slot = self.inner.get()?;
        match slot.lock().take() {
            Some(value) => Ok(value),
            None => unreachable!("unique future value taken twice"),
        }
    }

    /// Blocks until the value is available, then moves it out.
    pub fn wait(self) -> TaskResult<T> {
        self.inner.barrier().wait()?;
        self.take()
    }
}

impl<T> AsBarrier for UniqueFuture<T> {
    fn as_barrier(&self) -> &TaskBarrier {
        self.inner.barrier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn set_then_get_returns_the_same_value() {
        let (promise, future) = channel::<String>();
        assert!(!future.is_ready());
        promise.set("hello".to_string());

        let reader = future.clone();
        assert_eq!(future.get().unwrap(), "hello");
        assert!(std::ptr::eq(future.get().unwrap(), reader.get().unwrap()));
        assert!(future.ptr_eq(&reader));
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn second_set_panics() {
        let (promise, _future) = channel::<u32>();
        promise.set(1);
        promise.set(2);
    }

    #[test]
    fn try_set_reports_double_completion() {
        let (promise, future) = channel::<u32>();
        assert_eq!(promise.try_set(1), Ok(()));
        assert_eq!(promise.try_set(2), Err(FutureError::AlreadyCompleted));
        assert_eq!(
            promise.try_fail(TaskError::PoolShutDown),
            Err(FutureError::AlreadyCompleted)
        );
        assert_eq!(*future.get().unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "read before its barrier signaled")]
    fn get_before_signal_panics() {
        let (_promise, future) = channel::<u32>();
        let _ = future.get();
    }

    #[test]
    fn try_get_before_signal_is_none() {
        let (promise, future) = channel::<u32>();
        assert!(future.try_get().is_none());
        promise.set(5);
        assert_eq!(*future.try_get().unwrap().unwrap(), 5);
    }

    #[test]
    fn failure_is_reported_to_every_reader() {
        let (promise, future) = channel::<u32>();
        let other = future.clone();
        promise.fail(TaskError::failed(anyhow::anyhow!("decode error")));
        assert!(future.get().is_err());
        let err = other.get().unwrap_err();
        assert!(err.to_string().contains("decode error"));
    }

    #[test]
    fn dropping_an_unset_promise_breaks_the_future() {
        let (promise, future) = channel::<u32>();
        drop(promise);
        assert!(matches!(future.get(), Err(TaskError::BrokenPromise)));
    }

    #[test]
    fn wait_blocks_until_another_thread_sets() {
        let (promise, future) = channel::<u64>();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            promise.set(99);
        });
        assert_eq!(*future.wait().unwrap(), 99);
        producer.join().unwrap();
    }

    #[test]
    fn pipe_converts_into_a_related_type() {
        let (source, future) = channel::<u32>();
        let (target, text) = channel::<String>();
        future.pipe(target, |v| format!("value={v}"));
        assert!(!text.is_ready());
        source.set(7);
        assert_eq!(text.get().unwrap(), "value=7");
    }

    #[test]
    fn pipe_forwards_failures() {
        let (source, future) = channel::<u32>();
        let mapped = future.map(|v| v + 1);
        source.fail(TaskError::PoolShutDown);
        assert!(matches!(mapped.get(), Err(TaskError::PoolShutDown)));
    }

    #[test]
    fn try_pipe_surfaces_conversion_errors() {
        let (source, future) = channel::<u32>();
        let (target, parsed) = channel::<u8>();
        future.try_pipe(target, |v| Ok(u8::try_from(*v)?));
        source.set(1000);
        assert!(matches!(parsed.get(), Err(TaskError::Failed(_))));
    }

    #[test]
    fn ready_and_failed_constructors() {
        assert_eq!(*Future::ready(3).get().unwrap(), 3);
        assert!(Future::<u8>::failed(TaskError::PoolShutDown).get().is_err());
    }

    #[test]
    fn unique_future_moves_the_value_out() {
        let (promise, future) = unique_channel::<Vec<u8>>();
        let future = match future.try_take() {
            Err(pending) => pending,
            Ok(_) => panic!("future resolved before the promise was set"),
        };
        promise.set(vec![1, 2, 3]);
        assert_eq!(future.take().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unique_future_reports_failure() {
        let (promise, future) = unique_channel::<Vec<u8>>();
        promise.complete(Err(TaskError::PoolShutDown));
        assert!(future.wait().is_err());
    }
}
