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

//! Priority-ordered ready queue shared by the workers of one task class.

use crate::task::Task;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// A ready task plus its admission sequence number.
struct Ready {
    task: Task,
    seq: u64,
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    // Max-heap: higher priority first, then lower sequence (older) first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Heap {
    items: BinaryHeap<Ready>,
    next_seq: u64,
    /// Set by `close`; no task is accepted afterwards.
    closed: bool,
}

/// Tasks whose dependencies are all signaled, waiting for a thread.
pub(crate) struct ReadyQueue {
    heap: Mutex<Heap>,
    available: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: Mutex::new(Heap {
                items: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Queues `task`, or hands it back if the queue was closed.
    pub(crate) fn push(&self, task: Task) -> Result<(), Task> {
        let mut heap = self.heap.lock();
        if heap.closed {
            return Err(task);
        }
        let seq = heap.next_seq;
        heap.next_seq += 1;
        heap.items.push(Ready { task, seq });
        drop(heap);
        self.available.notify_one();
        Ok(())
    }

    pub(crate) fn try_pop(&self) -> Option<Task> {
        self.heap.lock().items.pop().map(|ready| ready.task)
    }

    /// Pops the best task, waiting up to `timeout` for one to arrive.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Task> {
        let mut heap = self.heap.lock();
        if heap.items.is_empty() {
            self.available.wait_for(&mut heap, timeout);
        }
        heap.items.pop().map(|ready| ready.task)
    }

    /// Closes the queue and returns the tasks it still held, in pop order.
    pub(crate) fn close(&self) -> Vec<Task> {
        let mut heap = self.heap.lock();
        heap.closed = true;
        std::mem::take(&mut heap.items)
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|ready| ready.task)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().items.len()
    }

    pub(crate) fn wake_all(&self) {
        self.available.notify_all();
    }
}
