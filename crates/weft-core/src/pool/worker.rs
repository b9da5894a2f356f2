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

//! Worker thread loop and per-thread role tracking.

use super::TaskQueue;
use crate::task::ThreadRole;
use std::cell::Cell;

thread_local! {
    /// The pool this thread belongs to, and its role in it.
    static BINDING: Cell<Option<(u64, ThreadRole)>> = const { Cell::new(None) };
}

pub(crate) fn bind(pool_id: u64, role: ThreadRole) {
    BINDING.with(|binding| binding.set(Some((pool_id, role))));
}

pub(crate) fn role_in(pool_id: u64) -> ThreadRole {
    match BINDING.with(Cell::get) {
        Some((id, role)) if id == pool_id => role,
        _ => ThreadRole::External,
    }
}

/// Body of every CPU and I/O worker thread.
pub(crate) fn run(queue: TaskQueue, role: ThreadRole) {
    bind(queue.shared.id, role);
    let name = std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string();
    log::debug!("Worker '{name}' started.");

    let ready = queue.shared.ready_queue_for(role);
    let poll = queue.shared.config.idle_poll();
    while queue.shared.is_running() {
        let Some(task) = ready.pop_timeout(poll) else {
            continue;
        };
        if queue.shared.is_running() {
            queue.run(task, role);
        } else {
            queue.shared.cancel(task);
        }
    }

    log::debug!("Worker '{name}' stopped.");
}
