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

//! Counting completion gates.
//!
//! A [`TaskBarrier`] starts with a count of outstanding completions. Tasks,
//! promises and external events (GPU fences) decrement it; once the count
//! reaches zero the barrier is *signaled* for good. Signaling wakes every
//! blocked waiter and runs the registered callbacks exactly once.
//!
//! # Callback thread
//!
//! Callbacks run on the thread that performs the final decrement. A callback
//! registered on a barrier that is already signaled runs immediately on the
//! registering thread. Callbacks must not block: they are used to chain
//! barriers together and to make dependent tasks ready.
//!
//! # Composite barriers
//!
//! ```
//! use weft_core::barrier::TaskBarrier;
//!
//! let a = TaskBarrier::new(1);
//! let b = TaskBarrier::new(1);
//! let both = TaskBarrier::lock().connect(&a).connect(&b).finish();
//!
//! a.decrement();
//! assert!(!both.is_signaled());
//! b.decrement();
//! assert!(both.is_signaled());
//! ```

use crate::error::{TaskError, TaskResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce(&TaskResult<()>) + Send + 'static>;

static NEXT_BARRIER_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identifier for a barrier, used in logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarrierId(u64);

impl fmt::Display for BarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "barrier#{}", self.0)
    }
}

struct BarrierState {
    remaining: usize,
    /// First failure reported while the barrier was pending.
    failure: Option<TaskError>,
    /// `Some` once signaled. Never reset.
    outcome: Option<TaskResult<()>>,
    callbacks: Vec<Callback>,
}

struct BarrierInner {
    id: BarrierId,
    state: Mutex<BarrierState>,
    signaled: Condvar,
}

/// A shared, counting completion gate with a one-way Pending → Signaled transition.
///
/// Cloning a barrier is cheap and yields another handle to the same gate.
#[derive(Clone)]
pub struct TaskBarrier {
    inner: Arc<BarrierInner>,
}

impl TaskBarrier {
    /// Creates a barrier expecting `count` completions.
    ///
    /// A count of zero produces a barrier that is already signaled.
    pub fn new(count: usize) -> Self {
        let outcome = if count == 0 { Some(Ok(())) } else { None };
        Self {
            inner: Arc::new(BarrierInner {
                id: BarrierId(NEXT_BARRIER_ID.fetch_add(1, Ordering::Relaxed)),
                state: Mutex::new(BarrierState {
                    remaining: count,
                    failure: None,
                    outcome,
                    callbacks: Vec::new(),
                }),
                signaled: Condvar::new(),
            }),
        }
    }

    /// Creates a barrier that is already signaled successfully.
    pub fn signaled() -> Self {
        Self::new(0)
    }

    /// Creates a barrier that is already signaled with `error`.
    pub fn failed(error: TaskError) -> Self {
        let barrier = Self::new(1);
        barrier.fail(error);
        barrier
    }

    /// Starts building a composite barrier. See [`BarrierLock`].
    pub fn lock() -> BarrierLock {
        BarrierLock::new(TaskBarrier::new(1))
    }

    /// Builds a barrier that signals once every barrier in `sources` has signaled.
    pub fn all<'a, B>(sources: impl IntoIterator<Item = &'a B>) -> TaskBarrier
    where
        B: AsBarrier + 'a,
    {
        sources
            .into_iter()
            .fold(TaskBarrier::lock(), |lock, source| lock.connect(source))
            .finish()
    }

    /// Returns a barrier that signals successfully once this one signals,
    /// whatever its outcome.
    ///
    /// Used for ordering gates where a failed predecessor must not poison the
    /// work that follows it.
    pub fn settled(&self) -> TaskBarrier {
        let settled = TaskBarrier::new(1);
        let gate = settled.clone();
        self.set_callback(move |_| gate.decrement());
        settled
    }

    /// Returns this barrier's identifier.
    pub fn id(&self) -> BarrierId {
        self.inner.id
    }

    pub(crate) fn downgrade(&self) -> WeakBarrier {
        WeakBarrier(Arc::downgrade(&self.inner))
    }

    /// Returns the number of completions still outstanding.
    pub fn remaining(&self) -> usize {
        self.inner.state.lock().remaining
    }

    /// Returns `true` once the count has reached zero.
    pub fn is_signaled(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Returns the outcome if the barrier has signaled, `None` otherwise.
    pub fn outcome(&self) -> Option<TaskResult<()>> {
        self.inner.state.lock().outcome.clone()
    }

    /// Returns `true` if both handles refer to the same barrier.
    pub fn ptr_eq(&self, other: &TaskBarrier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Raises the expected count by `count`.
    ///
    /// Used to tie additional events (another task, a fence value) to a
    /// barrier that has not signaled yet.
    ///
    /// # Panics
    ///
    /// Panics if the barrier has already signaled.
    pub fn add_dependencies(&self, count: usize) {
        let mut state = self.inner.state.lock();
        assert!(
            state.outcome.is_none(),
            "cannot add dependencies to {} after it signaled",
            self.inner.id
        );
        state.remaining += count;
    }

    /// Records one successful completion.
    ///
    /// # Panics
    ///
    /// Panics if the barrier has already signaled; its count would go negative.
    pub fn decrement(&self) {
        self.complete(None);
    }

    /// Records one completion that failed with `error`.
    ///
    /// The barrier keeps counting down; the first recorded failure becomes its
    /// outcome when it signals.
    ///
    /// # Panics
    ///
    /// Panics if the barrier has already signaled.
    pub fn fail(&self, error: TaskError) {
        self.complete(Some(error));
    }

    /// Records one completion with the given outcome.
    pub fn complete_with(&self, outcome: TaskResult<()>) {
        self.complete(outcome.err());
    }

    fn complete(&self, failure: Option<TaskError>) {
        let mut state = self.inner.state.lock();
        assert!(
            state.outcome.is_none(),
            "{} decremented after it signaled",
            self.inner.id
        );
        if let Some(error) = failure {
            state.failure.get_or_insert(error);
        }
        state.remaining -= 1;
        if state.remaining > 0 {
            return;
        }

        let outcome = match state.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        };
        state.outcome = Some(outcome.clone());
        let callbacks = std::mem::take(&mut state.callbacks);
        drop(state);

        log::trace!("{} signaled (ok = {})", self.inner.id, outcome.is_ok());
        self.inner.signaled.notify_all();
        for callback in callbacks {
            callback(&outcome);
        }
    }

    /// Registers a callback to run once, when the barrier signals.
    ///
    /// If the barrier has already signaled, the callback runs immediately on
    /// the calling thread.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnOnce(&TaskResult<()>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                callback(&outcome);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }

    /// Blocks the calling thread until the barrier signals.
    ///
    /// This does not help execute queued tasks; threads owned by a pool should
    /// use `TaskQueue::yield_until` instead.
    pub fn wait(&self) -> TaskResult<()> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.inner.signaled.wait(&mut state);
        }
    }

    /// Blocks until the barrier signals or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskResult<()>> {
        self.wait_deadline(Instant::now() + timeout)
    }

    /// Blocks until the barrier signals or `deadline` passes.
    pub fn wait_deadline(&self, deadline: Instant) -> Option<TaskResult<()>> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            if self
                .inner
                .signaled
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.outcome.clone();
            }
        }
    }
}

/// A non-owning reference to a barrier.
#[derive(Clone)]
pub(crate) struct WeakBarrier(Weak<BarrierInner>);

impl WeakBarrier {
    pub(crate) fn upgrade(&self) -> Option<TaskBarrier> {
        self.0.upgrade().map(|inner| TaskBarrier { inner })
    }

    pub(crate) fn is_dropped(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl Default for TaskBarrier {
    /// A default barrier is already signaled, matching the no-op code path.
    fn default() -> Self {
        Self::signaled()
    }
}

impl fmt::Debug for TaskBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskBarrier")
            .field("id", &self.inner.id)
            .field("remaining", &state.remaining)
            .field("signaled", &state.outcome.is_some())
            .finish()
    }
}

/// Anything that exposes a completion barrier: barriers themselves, futures,
/// task groups and resource handles.
pub trait AsBarrier {
    /// Returns the barrier that signals when this value completes.
    fn as_barrier(&self) -> &TaskBarrier;
}

impl AsBarrier for TaskBarrier {
    fn as_barrier(&self) -> &TaskBarrier {
        self
    }
}

impl<T: AsBarrier + ?Sized> AsBarrier for &T {
    fn as_barrier(&self) -> &TaskBarrier {
        (**self).as_barrier()
    }
}

/// Builder for a barrier that signals once all connected barriers have.
///
/// The lock holds one extra count on the target barrier so it cannot signal
/// while connections are still being added. The hold is released by
/// [`finish`](BarrierLock::finish), or when the lock is dropped.
#[must_use = "a barrier lock releases its hold when dropped"]
pub struct BarrierLock {
    barrier: TaskBarrier,
    released: bool,
}

impl BarrierLock {
    fn new(barrier: TaskBarrier) -> Self {
        Self {
            barrier,
            released: false,
        }
    }

    /// Locks an existing, still pending barrier so more sources can be connected to it.
    ///
    /// # Panics
    ///
    /// Panics if `barrier` has already signaled.
    pub fn on(barrier: &TaskBarrier) -> Self {
        barrier.add_dependencies(1);
        Self::new(barrier.clone())
    }

    /// Makes the locked barrier wait for `source` as well.
    ///
    /// A failure of `source` is forwarded to the locked barrier.
    pub fn connect(self, source: &impl AsBarrier) -> Self {
        self.barrier.add_dependencies(1);
        let target = self.barrier.clone();
        source
            .as_barrier()
            .set_callback(move |outcome| target.complete_with(outcome.clone()));
        self
    }

    /// Returns the barrier being built.
    pub fn barrier(&self) -> &TaskBarrier {
        &self.barrier
    }

    /// Releases the lock's hold and returns the composite barrier.
    pub fn finish(mut self) -> TaskBarrier {
        self.released = true;
        self.barrier.decrement();
        self.barrier.clone()
    }
}

impl Drop for BarrierLock {
    fn drop(&mut self) {
        if !self.released {
            self.barrier.decrement();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn zero_count_is_signaled_immediately() {
        let barrier = TaskBarrier::new(0);
        assert!(barrier.is_signaled());
        assert!(barrier.wait().is_ok());
        assert!(TaskBarrier::default().is_signaled());
    }

    #[test]
    fn signals_after_exactly_n_decrements() {
        let barrier = TaskBarrier::new(3);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        barrier.set_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        barrier.decrement();
        barrier.decrement();
        assert!(!barrier.is_signaled());
        assert_eq!(barrier.remaining(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        barrier.decrement();
        assert!(barrier.is_signaled());
        assert!(barrier.is_signaled());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "decremented after it signaled")]
    fn decrement_after_signal_panics() {
        let barrier = TaskBarrier::new(1);
        barrier.decrement();
        barrier.decrement();
    }

    #[test]
    #[should_panic(expected = "cannot add dependencies")]
    fn extending_a_signaled_barrier_panics() {
        TaskBarrier::signaled().add_dependencies(1);
    }

    #[test]
    fn callback_runs_on_the_final_decrementing_thread() {
        let barrier = TaskBarrier::new(1);
        let (tx, rx) = crossbeam_channel::bounded(1);
        barrier.set_callback(move |_| {
            tx.send(thread::current().id()).unwrap();
        });

        let remote = barrier.clone();
        let decrementer = thread::spawn(move || {
            remote.decrement();
            thread::current().id()
        });
        let decrementer_id = decrementer.join().unwrap();

        assert_eq!(rx.recv().unwrap(), decrementer_id);
    }

    #[test]
    fn callback_on_signaled_barrier_runs_inline() {
        let barrier = TaskBarrier::signaled();
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = ran_on.clone();
        barrier.set_callback(move |_| *slot.lock() = Some(thread::current().id()));
        assert_eq!(*ran_on.lock(), Some(caller));
    }

    #[test]
    fn first_failure_wins() {
        let barrier = TaskBarrier::new(3);
        barrier.fail(TaskError::Panicked {
            message: "first".into(),
        });
        barrier.decrement();
        barrier.fail(TaskError::Panicked {
            message: "second".into(),
        });
        match barrier.wait() {
            Err(TaskError::Panicked { message }) => assert_eq!(message, "first"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn wait_unblocks_when_another_thread_signals() {
        let barrier = TaskBarrier::new(1);
        let remote = barrier.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.decrement();
        });
        assert!(barrier.wait().is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_reports_pending() {
        let barrier = TaskBarrier::new(1);
        assert!(barrier.wait_timeout(Duration::from_millis(5)).is_none());
        barrier.decrement();
        assert!(matches!(
            barrier.wait_timeout(Duration::from_millis(5)),
            Some(Ok(()))
        ));
    }

    #[test]
    fn composite_signals_in_any_order() {
        for order in [[0usize, 1, 2], [2, 0, 1], [1, 2, 0]] {
            let sources: Vec<TaskBarrier> = (0..3).map(|_| TaskBarrier::new(1)).collect();
            let composite = TaskBarrier::lock()
                .connect(&sources[0])
                .connect(&sources[1])
                .connect(&sources[2])
                .finish();

            let fired = Arc::new(AtomicUsize::new(0));
            let counter = fired.clone();
            composite.set_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            for (step, index) in order.iter().enumerate() {
                assert!(!composite.is_signaled(), "signaled early at step {step}");
                sources[*index].decrement();
            }
            assert!(composite.is_signaled());
            assert_eq!(fired.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn composite_of_nothing_is_signaled() {
        let composite = TaskBarrier::lock().finish();
        assert!(composite.is_signaled());

        let empty: [TaskBarrier; 0] = [];
        assert!(TaskBarrier::all(&empty).is_signaled());
    }

    #[test]
    fn dropped_lock_releases_its_hold() {
        let source = TaskBarrier::new(1);
        let composite = {
            let lock = TaskBarrier::lock().connect(&source);
            lock.barrier().clone()
        };
        assert!(!composite.is_signaled());
        source.decrement();
        assert!(composite.is_signaled());
    }

    #[test]
    fn composite_forwards_failures() {
        let ok = TaskBarrier::new(1);
        let bad = TaskBarrier::new(1);
        let composite = TaskBarrier::all([&ok, &bad]);
        bad.fail(TaskError::PoolShutDown);
        assert!(!composite.is_signaled());
        ok.decrement();
        assert!(matches!(composite.wait(), Err(TaskError::PoolShutDown)));
    }

    #[test]
    fn lock_on_existing_barrier_extends_it() {
        let gate = TaskBarrier::new(1);
        let extra = TaskBarrier::new(1);
        BarrierLock::on(&gate).connect(&extra).finish();

        gate.decrement();
        assert!(!gate.is_signaled());
        extra.decrement();
        assert!(gate.is_signaled());
    }
}
